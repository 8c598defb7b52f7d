//! Domain types and models

mod credits;
mod identity;
mod job;

pub use credits::{
    admit, AdmissionPrompt, AnonymousData, CreditPackage, LedgerSnapshot, ProfilePackage,
    DEFAULT_FREE_LIMIT,
};
pub use identity::{Identity, IdentityKind};
pub use job::{Job, JobRecord, JobStatus};
