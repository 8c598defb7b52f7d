//! Background-removal job lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Job status as reported by the processing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Starting,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// `succeeded` and `failed` never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Starting => write!(f, "starting"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Local view of one unit of background-removal work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Image reference the job was submitted with
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Immutable history entry appended for an authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobRecord {
    pub job_id: String,
    pub identity_id: String,
    pub input: String,
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn from_job(identity_id: &str, job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            identity_id: identity_id.to_string(),
            input: job.input.clone(),
            output: job.output.clone(),
            created_at: Utc::now(),
        }
    }
}
