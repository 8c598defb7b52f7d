//! Job submission

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::Job;
use crate::providers::JobService;

/// Creation refused or unreachable. `message` is the service's `detail`
/// verbatim when it sent one.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SubmissionError {
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Clone)]
pub struct JobSubmitter {
    service: Arc<dyn JobService>,
}

impl JobSubmitter {
    pub fn new(service: Arc<dyn JobService>) -> Self {
        Self { service }
    }

    /// One creation request, never retried
    pub async fn submit(&self, image: &str) -> Result<Job, SubmissionError> {
        match self.service.create_job(image).await {
            Ok(resource) => {
                let job = resource.into_job(image);
                info!(
                    job_id = %job.id,
                    status = %job.status,
                    service = self.service.name(),
                    "Job submitted"
                );
                Ok(job)
            }
            Err(e) => {
                warn!(status = ?e.status(), error = %e, "Job submission failed");
                Err(SubmissionError {
                    status: e.status(),
                    message: e.detail(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::providers::mock::{Reply, ScriptedJobService};

    const IMAGE: &str = "https://cdn.example.com/cat.png";

    #[tokio::test]
    async fn test_submit_returns_starting_job() {
        let service = Arc::new(ScriptedJobService::new(Reply::status("job-1", JobStatus::Starting), vec![]));
        let job = JobSubmitter::new(service.clone()).submit(IMAGE).await.unwrap();

        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Starting);
        assert_eq!(job.input, IMAGE);
        assert_eq!(service.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_submit_error_carries_detail_verbatim() {
        let service = Arc::new(ScriptedJobService::new(Reply::error(500, "service unavailable"), vec![]));
        let err = JobSubmitter::new(service.clone()).submit(IMAGE).await.unwrap_err();

        assert_eq!(err.message, "service unavailable");
        assert_eq!(err.status, Some(500));
        assert_eq!(err.to_string(), "service unavailable");
        assert_eq!(service.create_calls(), 1);
        assert_eq!(service.fetch_calls(), 0);
    }
}
