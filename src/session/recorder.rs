//! Consumption recording
//!
//! Runs once a job has succeeded. Anonymous sessions advance the local
//! counter; authenticated sessions append to the job history. Both are
//! keyed by job id so a repeated call changes nothing.

use std::sync::Arc;
use tracing::{debug, info};

use super::ledger::UsageLedger;
use super::Session;
use crate::domain::{Job, JobRecord};
use crate::store::{ProfileStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Job id already counted
    Duplicate,
    /// The job did not succeed
    NotRecorded,
}

#[derive(Clone)]
pub struct UsageRecorder {
    profiles: Arc<dyn ProfileStore>,
}

impl UsageRecorder {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    pub async fn record(&self, session: &Session, job: &Job) -> StoreResult<RecordOutcome> {
        if !job.succeeded() {
            debug!(job_id = %job.id, status = %job.status, "Not recording unsuccessful job");
            return Ok(RecordOutcome::NotRecorded);
        }

        let identity = session.identity();
        let fresh = match session.ledger() {
            UsageLedger::Local(ledger) => ledger.record_job(&job.id),
            UsageLedger::Subscribed(_) => {
                self.profiles
                    .append_job_record(&JobRecord::from_job(&identity.id, job))
                    .await?
            }
        };

        if fresh {
            info!(job_id = %job.id, identity = %identity.id, kind = %identity.kind, "Usage recorded");
            Ok(RecordOutcome::Recorded)
        } else {
            debug!(job_id = %job.id, "Usage already recorded");
            Ok(RecordOutcome::Duplicate)
        }
    }
}
