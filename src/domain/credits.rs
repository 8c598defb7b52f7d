//! Credit packages, ledger snapshots and the admission gate

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::identity::{Identity, IdentityKind};

/// Free jobs granted to an anonymous visitor before sign-in is required
pub const DEFAULT_FREE_LIMIT: u32 = 100;

/// Catalog entry. The zero-price package is the free tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreditPackage {
    pub id: String,
    pub price: f64,
    pub limit: u32,
}

impl CreditPackage {
    pub fn new(id: impl Into<String>, price: f64, limit: u32) -> Self {
        Self {
            id: id.into(),
            price: price.max(0.0),
            limit,
        }
    }

    pub fn is_free(&self) -> bool {
        self.price == 0.0
    }
}

/// Package currently held by an authenticated profile, with consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProfilePackage {
    pub id: String,
    pub price: f64,
    pub limit: u32,
    pub used: u32,
}

impl ProfilePackage {
    /// Fresh assignment of a catalog package with nothing consumed
    pub fn assign(package: &CreditPackage) -> Self {
        Self {
            id: package.id.clone(),
            price: package.price,
            limit: package.limit,
            used: 0,
        }
    }
}

/// Anonymous usage record persisted on the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnonymousData {
    #[serde(default)]
    pub used: u32,
}

/// `{used, limit, packageId}` for the active identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerSnapshot {
    pub used: u32,
    pub limit: u32,
    pub package_id: Option<String>,
}

impl LedgerSnapshot {
    pub fn new(used: u32, limit: u32, package_id: Option<String>) -> Self {
        Self {
            used,
            limit,
            package_id,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Consumed share of the limit, rounded up to a whole percent
    pub fn usage_percent(&self) -> u32 {
        if self.limit == 0 {
            return 0;
        }
        let used = u64::from(self.used) * 100;
        let limit = u64::from(self.limit);
        ((used + limit - 1) / limit) as u32
    }
}

impl From<&ProfilePackage> for LedgerSnapshot {
    fn from(package: &ProfilePackage) -> Self {
        Self {
            used: package.used,
            limit: package.limit,
            package_id: Some(package.id.clone()),
        }
    }
}

/// Admission gate: a new job may start only while `used < limit`.
///
/// Advisory only; quota is enforced by the reservation taken right after.
pub fn admit(ledger: &LedgerSnapshot) -> bool {
    ledger.used < ledger.limit
}

/// What a refused caller should be offered instead of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPrompt {
    /// Anonymous visitor out of free jobs: sign in for the free package
    SignIn,
    /// Signed-in user out of credits: buy a larger package
    Purchase,
}

impl AdmissionPrompt {
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.kind {
            IdentityKind::Anonymous => AdmissionPrompt::SignIn,
            IdentityKind::Authenticated => AdmissionPrompt::Purchase,
        }
    }
}
