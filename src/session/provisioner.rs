//! First-login profile creation

use std::sync::Arc;
use tracing::info;

use crate::store::{PackageCatalog, ProfileStore, StoreResult};

/// Gives each authenticated user a profile holding the free package,
/// exactly once
#[derive(Clone)]
pub struct ProfileProvisioner {
    profiles: Arc<dyn ProfileStore>,
    catalog: Arc<dyn PackageCatalog>,
}

impl ProfileProvisioner {
    pub fn new(profiles: Arc<dyn ProfileStore>, catalog: Arc<dyn PackageCatalog>) -> Self {
        Self { profiles, catalog }
    }

    /// Returns `true` when this call created the profile. Safe to call
    /// concurrently; the store's create-if-absent settles races.
    pub async fn ensure_profile(&self, user_id: &str) -> StoreResult<bool> {
        if self.profiles.load_profile(user_id).await?.is_some() {
            return Ok(false);
        }

        let free = self.catalog.free_package().await?;
        let created = self.profiles.create_profile_if_absent(user_id, &free).await?;
        if created {
            info!(user_id, package_id = %free.id, limit = free.limit, "Provisioned profile");
        }
        Ok(created)
    }
}
