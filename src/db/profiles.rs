//! Profile and job history database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{debug, info, warn};

use super::pool::DbPool;
use crate::domain::{CreditPackage, JobRecord, ProfilePackage};
use crate::store::{ProfileStore, StoreResult, Subscription, SubscriptionHub};

/// `revision` is advanced by a trigger on every write and orders publishes
const PROFILE_COLUMNS: &str = "package_id, package_price, package_limit, package_used, revision";

/// Postgres-backed `ProfileStore`. Every write publishes the new profile to
/// local subscribers; writes made by other processes arrive through
/// `spawn_profile_listener`, which calls `refresh`.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: DbPool,
    hub: SubscriptionHub,
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_revision(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn profile_from_row(row: &Row) -> (u64, ProfilePackage) {
    let profile = ProfilePackage {
        id: row.get("package_id"),
        price: row.get("package_price"),
        limit: to_u32(row.get("package_limit")),
        used: to_u32(row.get("package_used")),
    };
    (to_revision(row.get("revision")), profile)
}

fn record_from_row(row: &Row) -> JobRecord {
    JobRecord {
        job_id: row.get("job_id"),
        identity_id: row.get("user_id"),
        input: row.get("input"),
        output: row.get("output"),
        created_at: row.get::<_, DateTime<Utc>>("created_at"),
    }
}

impl PgProfileStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            hub: SubscriptionHub::new(),
        }
    }

    /// Reload the profile and push it to subscribers, if there are any
    pub async fn refresh(&self, user_id: &str) -> StoreResult<()> {
        if !self.hub.is_watched(user_id) {
            return Ok(());
        }
        if let Some((revision, profile)) = self.load_revision(user_id).await? {
            self.hub.publish(user_id, revision, Some(profile));
            debug!(user_id, revision, "Profile refreshed from notification");
        }
        Ok(())
    }

    async fn load_revision(&self, user_id: &str) -> StoreResult<Option<(u64, ProfilePackage)>> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            format!("SELECT {} FROM profiles WHERE user_id = $1", PROFILE_COLUMNS).as_str(),
            &[&user_id]
        ).await?;

        Ok(row.as_ref().map(profile_from_row))
    }

    /// Run a single-row profile UPDATE ... RETURNING and publish the result
    async fn update_returning(&self, user_id: &str, sql: &str) -> StoreResult<bool> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql, &[&user_id]).await?;

        match row {
            Some(row) => {
                let (revision, profile) = profile_from_row(&row);
                self.hub.publish(user_id, revision, Some(profile));
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn create_profile_if_absent(&self, user_id: &str, package: &CreditPackage) -> StoreResult<bool> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            format!(
                r#"
                INSERT INTO profiles (user_id, package_id, package_price, package_limit, package_used)
                VALUES ($1, $2, $3, $4, 0)
                ON CONFLICT (user_id) DO NOTHING
                RETURNING {}
                "#,
                PROFILE_COLUMNS
            ).as_str(),
            &[&user_id, &package.id, &package.price, &to_i32(package.limit)]
        ).await?;

        match row {
            Some(row) => {
                let (revision, profile) = profile_from_row(&row);
                info!(user_id, package_id = %package.id, "Created profile");
                self.hub.publish(user_id, revision, Some(profile));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_profile(&self, user_id: &str) -> StoreResult<Option<ProfilePackage>> {
        Ok(self.load_revision(user_id).await?.map(|(_, profile)| profile))
    }

    /// Writes that land between the first read and registering the topic
    /// are not published, so the profile is read once more afterwards.
    async fn subscribe(&self, user_id: &str) -> StoreResult<Subscription> {
        let (revision, current) = match self.load_revision(user_id).await? {
            Some((revision, profile)) => (revision, Some(profile)),
            None => (0, None),
        };
        let subscription = self.hub.subscribe(user_id, revision, current);

        if let Some((revision, profile)) = self.load_revision(user_id).await? {
            self.hub.publish(user_id, revision, Some(profile));
        }
        Ok(subscription)
    }

    async fn try_reserve_credit(&self, user_id: &str) -> StoreResult<bool> {
        self.update_returning(
            user_id,
            &format!(
                r#"
                UPDATE profiles
                SET package_used = package_used + 1
                WHERE user_id = $1 AND package_used < package_limit
                RETURNING {}
                "#,
                PROFILE_COLUMNS
            ),
        ).await
    }

    async fn release_credit(&self, user_id: &str) -> StoreResult<()> {
        let released = self.update_returning(
            user_id,
            &format!(
                r#"
                UPDATE profiles
                SET package_used = GREATEST(package_used - 1, 0)
                WHERE user_id = $1
                RETURNING {}
                "#,
                PROFILE_COLUMNS
            ),
        ).await?;

        if !released {
            warn!(user_id, "Released a credit for a missing profile");
        }
        Ok(())
    }

    async fn append_job_record(&self, record: &JobRecord) -> StoreResult<bool> {
        let client = self.pool.get().await?;

        let inserted = client.execute(
            r#"
            INSERT INTO job_records (job_id, user_id, input, output, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO NOTHING
            "#,
            &[&record.job_id, &record.identity_id, &record.input, &record.output, &record.created_at]
        ).await?;

        Ok(inserted == 1)
    }

    async fn job_history(&self, user_id: &str, limit: u32) -> StoreResult<Vec<JobRecord>> {
        let client = self.pool.get().await?;

        let rows = client.query(
            r#"
            SELECT job_id, user_id, input, output, created_at
            FROM job_records
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            &[&user_id, &i64::from(limit)]
        ).await?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}
