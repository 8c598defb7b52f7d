//! Job status polling
//!
//! Drives a submitted job to `succeeded` or `failed`. One status request at
//! a time, a fixed interval between polls, a hard cap on the number of
//! polls. Transport failures, 429 and 5xx are retried with capped
//! exponential backoff; any other error aborts.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::PollingSettings;
use crate::domain::Job;
use crate::providers::{JobResource, JobService};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    /// Permanent failure; `detail` is the service message verbatim
    #[error("{detail}")]
    Rejected { status: Option<u16>, detail: String },

    /// Transient failures outlasted the retry budget; `detail` is the last
    /// service message verbatim
    #[error("{detail}")]
    Unavailable { attempts: u32, detail: String },

    #[error("Job {job_id} not finished after {polls} polls")]
    Exhausted { job_id: String, polls: u32 },

    #[error("Polling cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
    pub max_transient_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingSettings::default())
    }
}

impl From<&PollingSettings> for PollPolicy {
    fn from(settings: &PollingSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_polls: settings.max_polls,
            max_transient_retries: settings.max_transient_retries,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_cap)
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = (base.as_millis() / 10) as u64;
        let jitter = if spread == 0 { 0 } else { rand::thread_rng().gen_range(0..=spread) };
        base + Duration::from_millis(jitter)
    }
}

#[derive(Clone)]
pub struct JobPoller {
    service: Arc<dyn JobService>,
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(service: Arc<dyn JobService>, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    /// Poll until the job is terminal. Nothing is fetched after `cancel`
    /// fires, and a result arriving after it is discarded.
    #[instrument(skip(self, job, cancel), fields(job_id = %job.id))]
    pub async fn run(&self, mut job: Job, cancel: &CancellationToken) -> Result<Job, PollError> {
        let mut polls = 0u32;

        while !job.is_terminal() {
            if polls >= self.policy.max_polls {
                warn!(polls, status = %job.status, "Poll budget exhausted");
                return Err(PollError::Exhausted {
                    job_id: job.id.clone(),
                    polls,
                });
            }

            pause(self.policy.interval, cancel).await?;
            let resource = self.fetch(&job.id, cancel).await?;
            polls += 1;

            let next = resource.into_job(&job.input);
            if next.status != job.status {
                info!(from = %job.status, to = %next.status, polls, "Job status changed");
            }
            job = next;
        }

        info!(status = %job.status, polls, "Job reached terminal state");
        Ok(job)
    }

    async fn fetch(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobResource, PollError> {
        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                result = self.service.fetch_job(job_id) => result,
            };

            match result {
                Ok(resource) => return Ok(resource),
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures > self.policy.max_transient_retries {
                        warn!(attempts = failures, error = %e, "Giving up on status checks");
                        return Err(PollError::Unavailable {
                            attempts: failures,
                            detail: e.detail(),
                        });
                    }
                    let delay = self.policy.jittered_backoff(failures);
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Status check failed, retrying"
                    );
                    pause(delay, cancel).await?;
                }
                Err(e) => {
                    warn!(status = ?e.status(), error = %e, "Status check rejected");
                    return Err(PollError::Rejected {
                        status: e.status(),
                        detail: e.detail(),
                    });
                }
            }
        }
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), PollError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::providers::mock::{Reply, ScriptedJobService};
    use tokio_test::assert_ok;

    fn starting() -> Job {
        Job {
            id: "job-1".to_string(),
            status: JobStatus::Starting,
            input: "https://cdn.example.com/cat.png".to_string(),
            output: None,
            error: None,
        }
    }

    fn poller(service: &Arc<ScriptedJobService>, max_polls: u32) -> JobPoller {
        let policy = PollPolicy {
            max_polls,
            ..PollPolicy::default()
        };
        JobPoller::new(service.clone(), policy)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(20), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_through_lifecycle() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![
                Reply::status("job-1", JobStatus::Processing),
                Reply::succeeded("job-1", "https://cdn.example.com/cat-cutout.png"),
            ],
        ));

        let job = assert_ok!(poller(&service, 600).run(starting(), &CancellationToken::new()).await);

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.output.as_deref(), Some("https://cdn.example.com/cat-cutout.png"));
        assert_eq!(job.input, "https://cdn.example.com/cat.png");
        assert_eq!(service.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_sequential() {
        let service = Arc::new(
            ScriptedJobService::new(
                Reply::status("job-1", JobStatus::Starting),
                vec![
                    Reply::status("job-1", JobStatus::Processing),
                    Reply::status("job-1", JobStatus::Processing),
                    Reply::status("job-1", JobStatus::Processing),
                    Reply::failed("job-1", "unsupported image"),
                ],
            )
            .with_fetch_delay(Duration::from_millis(2500)),
        );

        let job = poller(&service, 600).run(starting(), &CancellationToken::new()).await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("unsupported image"));
        assert_eq!(service.fetch_calls(), 4);
        assert_eq!(service.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_is_not_polled() {
        let service = Arc::new(ScriptedJobService::new(Reply::status("job-1", JobStatus::Starting), vec![]));
        let mut job = starting();
        job.status = JobStatus::Succeeded;

        poller(&service, 600).run(job, &CancellationToken::new()).await.unwrap();
        assert_eq!(service.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_polls() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![Reply::status("job-1", JobStatus::Processing)],
        ));

        let err = poller(&service, 3).run(starting(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err, PollError::Exhausted { job_id: "job-1".to_string(), polls: 3 });
        assert_eq!(service.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![
                Reply::error(503, "warming up"),
                Reply::error(429, "slow down"),
                Reply::succeeded("job-1", "https://cdn.example.com/out.png"),
            ],
        ));

        let job = poller(&service, 600).run(starting(), &CancellationToken::new()).await.unwrap();
        assert!(job.succeeded());
        assert_eq!(service.fetch_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_after_retry_budget() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![Reply::error(502, "bad gateway")],
        ));

        let err = poller(&service, 600).run(starting(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err, PollError::Unavailable { attempts: 4, detail: "bad gateway".to_string() });
        assert_eq!(err.to_string(), "bad gateway");
        assert_eq!(service.fetch_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_aborts_with_detail() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![Reply::error(404, "job not found")],
        ));

        let err = poller(&service, 600).run(starting(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err, PollError::Rejected { status: Some(404), detail: "job not found".to_string() });
        assert_eq!(err.to_string(), "job not found");
        assert_eq!(service.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_ticks_stops_fetching() {
        let service = Arc::new(ScriptedJobService::new(
            Reply::status("job-1", JobStatus::Starting),
            vec![Reply::status("job-1", JobStatus::Processing)],
        ));
        let cancel = CancellationToken::new();
        let poller = poller(&service, 600);

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(starting(), &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(service.fetch_calls(), 2);
        cancel.cancel();

        assert_eq!(task.await.unwrap(), Err(PollError::Cancelled));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.fetch_calls(), 2);
    }
}
