//! Processing service integration
//!
//! ```text
//!   JobSubmitter / JobPoller
//!            │
//!     ┌──────┴───────┐
//!     │  JobService  │  (trait)
//!     └──────┬───────┘
//!            │
//!     HttpJobService ── RateLimitedClient ── POST /jobs, GET /jobs/{id}
//! ```

pub mod traits;
pub mod http_client;
pub mod processing;
#[cfg(test)]
pub mod mock;

pub use traits::{JobResource, JobService, JobServiceError, JobServiceResult};
pub use processing::HttpJobService;
