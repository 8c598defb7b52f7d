//! Usage storage contracts
//!
//! Authenticated profiles, job history, the package catalog and session
//! tokens live behind these traits. `db` provides the PostgreSQL backend;
//! `MemoryStore` backs development runs without a database and the tests.

pub mod memory;
pub mod subscription;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use crate::domain::{CreditPackage, JobRecord, ProfilePackage};

pub use memory::MemoryStore;
pub use subscription::{Subscription, SubscriptionHub};

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::CreatePoolError),
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("Pool get error: {0}")]
    PoolGet(#[from] deadpool_postgres::PoolError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Package catalog has no zero-price package")]
    NoFreePackage,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which backend is serving profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Postgres,
    Memory,
}

/// Remote per-user profile document plus the job history
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create the profile holding `package` unless the user already has one.
    /// Returns `true` only for the call that created it.
    async fn create_profile_if_absent(&self, user_id: &str, package: &CreditPackage) -> StoreResult<bool>;

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<ProfilePackage>>;

    /// Live view of the profile; every change is pushed to the subscription
    async fn subscribe(&self, user_id: &str) -> StoreResult<Subscription>;

    /// Atomically consume one credit if `used < limit`
    async fn try_reserve_credit(&self, user_id: &str) -> StoreResult<bool>;

    /// Give back a credit taken by `try_reserve_credit` (never below zero)
    async fn release_credit(&self, user_id: &str) -> StoreResult<()>;

    /// Append a history entry. Returns `false` if the job id is already recorded.
    async fn append_job_record(&self, record: &JobRecord) -> StoreResult<bool>;

    /// Newest first
    async fn job_history(&self, user_id: &str, limit: u32) -> StoreResult<Vec<JobRecord>>;
}

/// Read-only credit package catalog
#[async_trait]
pub trait PackageCatalog: Send + Sync {
    /// All packages, ascending by price
    async fn list_packages(&self) -> StoreResult<Vec<CreditPackage>>;

    /// Package assigned to every new profile
    async fn free_package(&self) -> StoreResult<CreditPackage> {
        self.list_packages()
            .await?
            .into_iter()
            .find(CreditPackage::is_free)
            .ok_or(StoreError::NoFreePackage)
    }
}

/// Maps a bearer session token to a user id
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> StoreResult<Option<String>>;
}

/// Hash a session token using SHA-256
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
