//! In-process store used when no database is configured

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{CreditPackage, JobRecord, ProfilePackage};
use super::{
    token_digest, PackageCatalog, ProfileStore, StoreResult, Subscription, SubscriptionHub,
    TokenVerifier,
};

/// Profiles, history, catalog and tokens held in memory
pub struct MemoryStore {
    packages: RwLock<Vec<CreditPackage>>,
    profiles: Mutex<HashMap<String, ProfilePackage>>,
    /// Bumped under the `profiles` lock on every profile write
    revision: AtomicU64,
    records: Mutex<Vec<JobRecord>>,
    /// token digest -> user id
    tokens: DashMap<String, String>,
    hub: SubscriptionHub,
}

impl MemoryStore {
    pub fn new(mut packages: Vec<CreditPackage>) -> Self {
        packages.sort_by(|a, b| a.price.total_cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
        Self {
            packages: RwLock::new(packages),
            profiles: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            records: Mutex::new(Vec::new()),
            tokens: DashMap::new(),
            hub: SubscriptionHub::new(),
        }
    }

    /// Development catalog: the free tier plus two paid packages
    pub fn with_default_catalog() -> Self {
        Self::new(vec![
            CreditPackage::new("free", 0.0, 100),
            CreditPackage::new("starter", 5.0, 500),
            CreditPackage::new("pro", 15.0, 2000),
        ])
    }

    #[cfg(test)]
    pub fn register_token(&self, token: &str, user_id: &str) {
        self.tokens.insert(token_digest(token), user_id.to_string());
    }

    /// Swap the user's package, as the purchase flow would
    #[cfg(test)]
    pub fn set_package(&self, user_id: &str, package: ProfilePackage) {
        let mut profiles = self.profiles.lock();
        profiles.insert(user_id.to_string(), package.clone());
        tracing::info!(user_id, package_id = %package.id, "Profile package replaced");
        self.hub.publish(user_id, self.next_revision(), Some(package));
    }

    #[cfg(test)]
    pub fn profile_count(&self) -> usize {
        self.profiles.lock().len()
    }

    #[cfg(test)]
    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    #[cfg(test)]
    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Call with the `profiles` lock held
    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply `change` to the profile and publish the result. Publishing
    /// happens under the lock so subscribers see writes in order.
    fn update_profile<F>(&self, user_id: &str, change: F) -> bool
    where
        F: FnOnce(&mut ProfilePackage) -> bool,
    {
        let mut profiles = self.profiles.lock();
        let Some(profile) = profiles.get_mut(user_id) else {
            return false;
        };
        if !change(profile) {
            return false;
        }
        let updated = profile.clone();
        self.hub.publish(user_id, self.next_revision(), Some(updated));
        true
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn create_profile_if_absent(&self, user_id: &str, package: &CreditPackage) -> StoreResult<bool> {
        let mut profiles = self.profiles.lock();
        if profiles.contains_key(user_id) {
            return Ok(false);
        }
        let profile = ProfilePackage::assign(package);
        profiles.insert(user_id.to_string(), profile.clone());
        self.hub.publish(user_id, self.next_revision(), Some(profile));
        Ok(true)
    }

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<ProfilePackage>> {
        Ok(self.profiles.lock().get(user_id).cloned())
    }

    async fn subscribe(&self, user_id: &str) -> StoreResult<Subscription> {
        let profiles = self.profiles.lock();
        let revision = self.revision.load(Ordering::SeqCst);
        Ok(self.hub.subscribe(user_id, revision, profiles.get(user_id).cloned()))
    }

    async fn try_reserve_credit(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.update_profile(user_id, |profile| {
            if profile.used < profile.limit {
                profile.used += 1;
                true
            } else {
                false
            }
        }))
    }

    async fn release_credit(&self, user_id: &str) -> StoreResult<()> {
        self.update_profile(user_id, |profile| {
            profile.used = profile.used.saturating_sub(1);
            true
        });
        Ok(())
    }

    async fn append_job_record(&self, record: &JobRecord) -> StoreResult<bool> {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.job_id == record.job_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn job_history(&self, user_id: &str, limit: u32) -> StoreResult<Vec<JobRecord>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.identity_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PackageCatalog for MemoryStore {
    async fn list_packages(&self) -> StoreResult<Vec<CreditPackage>> {
        Ok(self.packages.read().clone())
    }
}

#[async_trait]
impl TokenVerifier for MemoryStore {
    async fn verify(&self, token: &str) -> StoreResult<Option<String>> {
        Ok(self.tokens.get(&token_digest(token)).map(|user| user.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobStatus};
    use crate::store::StoreError;
    use std::sync::Arc;

    fn free() -> CreditPackage {
        CreditPackage::new("free", 0.0, 2)
    }

    #[tokio::test]
    async fn test_catalog_is_sorted_by_price() {
        let store = MemoryStore::new(vec![
            CreditPackage::new("pro", 15.0, 2000),
            CreditPackage::new("free", 0.0, 100),
            CreditPackage::new("starter", 5.0, 500),
        ]);
        let ids: Vec<String> = store.list_packages().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["free", "starter", "pro"]);
        assert_eq!(store.free_package().await.unwrap().id, "free");
    }

    #[tokio::test]
    async fn test_missing_free_package() {
        let store = MemoryStore::new(vec![CreditPackage::new("pro", 15.0, 2000)]);
        assert!(matches!(store.free_package().await, Err(StoreError::NoFreePackage)));
    }

    #[tokio::test]
    async fn test_concurrent_profile_creation_creates_one() {
        let store = Arc::new(MemoryStore::new(vec![free()]));
        let package = free();

        let (a, b) = tokio::join!(
            store.create_profile_if_absent("u1", &package),
            store.create_profile_if_absent("u1", &package),
        );

        assert!(a.unwrap() ^ b.unwrap());
        assert_eq!(store.profile_count(), 1);
        assert_eq!(store.load_profile("u1").await.unwrap().unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_reservation_stops_at_limit() {
        let store = MemoryStore::new(vec![free()]);
        store.create_profile_if_absent("u1", &free()).await.unwrap();

        assert!(store.try_reserve_credit("u1").await.unwrap());
        assert!(store.try_reserve_credit("u1").await.unwrap());
        assert!(!store.try_reserve_credit("u1").await.unwrap());

        store.release_credit("u1").await.unwrap();
        assert_eq!(store.load_profile("u1").await.unwrap().unwrap().used, 1);
        assert!(!store.try_reserve_credit("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_never_goes_negative() {
        let store = MemoryStore::new(vec![free()]);
        store.create_profile_if_absent("u1", &free()).await.unwrap();
        store.release_credit("u1").await.unwrap();
        assert_eq!(store.load_profile("u1").await.unwrap().unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_subscription_sees_purchase() {
        let store = MemoryStore::new(vec![free()]);
        store.create_profile_if_absent("u1", &free()).await.unwrap();
        let mut sub = store.subscribe("u1").await.unwrap();

        store.set_package("u1", ProfilePackage {
            id: "starter".to_string(),
            price: 5.0,
            limit: 500,
            used: 0,
        });

        let pushed = sub.changed().await.unwrap().unwrap();
        assert_eq!(pushed.id, "starter");
        assert_eq!(pushed.limit, 500);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_latest_usage() {
        let store = Arc::new(MemoryStore::new(vec![free()]));
        store.create_profile_if_absent("u1", &CreditPackage::new("free", 0.0, 10)).await.unwrap();
        let first = store.subscribe("u1").await.unwrap();

        let (a, b) = tokio::join!(store.try_reserve_credit("u1"), store.try_reserve_credit("u1"));
        assert!(a.unwrap() && b.unwrap());

        let second = store.subscribe("u1").await.unwrap();
        assert_eq!(first.current().map(|p| p.used), Some(2));
        assert_eq!(second.current().map(|p| p.used), Some(2));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_deduplicated() {
        let store = MemoryStore::new(vec![free()]);
        let job = |id: &str| Job {
            id: id.to_string(),
            status: JobStatus::Succeeded,
            input: "https://cdn.example.com/in.png".to_string(),
            output: Some("https://cdn.example.com/out.png".to_string()),
            error: None,
        };

        assert!(store.append_job_record(&JobRecord::from_job("u1", &job("a"))).await.unwrap());
        assert!(store.append_job_record(&JobRecord::from_job("u1", &job("b"))).await.unwrap());
        assert!(!store.append_job_record(&JobRecord::from_job("u1", &job("a"))).await.unwrap());
        assert!(store.append_job_record(&JobRecord::from_job("u2", &job("c"))).await.unwrap());

        let history = store.job_history("u1", 10).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_token_verification() {
        let store = MemoryStore::with_default_catalog();
        store.register_token("cgs_valid", "user-7");

        assert_eq!(store.verify("cgs_valid").await.unwrap().as_deref(), Some("user-7"));
        assert_eq!(store.verify("cgs_other").await.unwrap(), None);
    }
}
