//! One background-removal attempt: gate, reserve, submit, poll, record

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::poller::{JobPoller, PollError, PollPolicy};
use super::recorder::UsageRecorder;
use super::reservation::Reservation;
use super::submitter::{JobSubmitter, SubmissionError};
use super::Session;
use crate::domain::{admit, AdmissionPrompt, Job, LedgerSnapshot};
use crate::providers::JobService;
use crate::store::{ProfileStore, StoreError};

#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("No credits left")]
    AdmissionDenied {
        prompt: AdmissionPrompt,
        usage: LedgerSnapshot,
    },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Terminal outcome of an admitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Succeeded { job: Job },
    /// Normal terminal state; nothing is recorded
    Failed { job: Job },
}

pub struct RemovalFlow {
    profiles: Arc<dyn ProfileStore>,
    submitter: JobSubmitter,
    poller: JobPoller,
    recorder: UsageRecorder,
}

impl RemovalFlow {
    pub fn new(service: Arc<dyn JobService>, profiles: Arc<dyn ProfileStore>, policy: PollPolicy) -> Self {
        Self {
            submitter: JobSubmitter::new(Arc::clone(&service)),
            poller: JobPoller::new(service, policy),
            recorder: UsageRecorder::new(Arc::clone(&profiles)),
            profiles,
        }
    }

    /// Run one attempt for `image` inside `session`.
    ///
    /// The credit held between gate and outcome is released on every path
    /// except success, including this future being dropped.
    #[instrument(skip_all, fields(identity = %session.identity().id, kind = %session.identity().kind))]
    pub async fn run(
        &self,
        session: &Session,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<RemovalOutcome, RemovalError> {
        let prompt = AdmissionPrompt::for_identity(session.identity());

        let usage = session.ledger().snapshot();
        if !admit(&usage) {
            info!(used = usage.used, limit = usage.limit, "Admission denied");
            return Err(RemovalError::AdmissionDenied { prompt, usage });
        }

        let Some(reservation) = Reservation::acquire(session, &self.profiles).await? else {
            let usage = session.ledger().snapshot();
            info!(used = usage.used, limit = usage.limit, "Admission denied at reservation");
            return Err(RemovalError::AdmissionDenied { prompt, usage });
        };

        let job = match self.submitter.submit(image).await {
            Ok(job) => job,
            Err(e) => {
                reservation.release().await;
                return Err(e.into());
            }
        };

        let job = match self.poller.run(job, cancel).await {
            Ok(job) => job,
            Err(e) => {
                reservation.release().await;
                return Err(e.into());
            }
        };

        if !job.succeeded() {
            info!(job_id = %job.id, error = ?job.error, "Job failed");
            reservation.release().await;
            return Ok(RemovalOutcome::Failed { job });
        }

        // Settled before the history write: the credit stays spent even if
        // that write fails or this future is dropped while it runs.
        reservation.confirm();
        if let Err(e) = self.recorder.record(session, &job).await {
            error!(job_id = %job.id, error = %e, "Failed to record usage");
        }

        Ok(RemovalOutcome::Succeeded { job })
    }
}
