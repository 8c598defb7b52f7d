//! Processing service contract
//!
//! The background-removal work itself runs in an external job service.
//! `JobService` is the seam between the session logic and that service;
//! `HttpJobService` talks to the real endpoint, tests script their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Job, JobStatus};

// ============================================================================
// Error Types
// ============================================================================

/// Processing service error types
#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status; `detail` is the service's own message
    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl JobServiceError {
    pub fn status(&self) -> Option<u16> {
        match self {
            JobServiceError::Api { status, .. } => Some(*status),
            JobServiceError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            JobServiceError::Http(e) => !e.is_builder() && !e.is_decode(),
            JobServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            JobServiceError::Parse(_) | JobServiceError::Endpoint(_) => false,
        }
    }

    /// Message to surface to the caller
    pub fn detail(&self) -> String {
        match self {
            JobServiceError::Api { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for processing service calls
pub type JobServiceResult<T> = Result<T, JobServiceError>;

// ============================================================================
// Wire Types
// ============================================================================

/// `POST /jobs` body
#[derive(Debug, Serialize)]
pub struct CreateJobRequest<'a> {
    pub image: &'a str,
}

/// Job representation returned by both creation and status calls
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobResource {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobResource {
    /// Convert into the local job, keeping `known_input` when the
    /// service omits the input (status responses do)
    pub fn into_job(self, known_input: &str) -> Job {
        Job {
            id: self.id,
            status: self.status,
            input: self.input.unwrap_or_else(|| known_input.to_string()),
            output: self.output,
            error: self.error,
        }
    }
}

/// Error body of any non-success response
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait JobService: Send + Sync {
    /// Service name for logs
    fn name(&self) -> &str;

    /// `POST /jobs`; anything but 201 is an error
    async fn create_job(&self, image: &str) -> JobServiceResult<JobResource>;

    /// `GET /jobs/{id}`; anything but 200 is an error
    async fn fetch_job(&self, id: &str) -> JobServiceResult<JobResource>;
}
