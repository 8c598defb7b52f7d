//! Session token verification
//!
//! Tokens are issued by the identity provider and stored here as a lookup
//! prefix plus a SHA-256 digest. The plain token never touches the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::pool::DbPool;
use crate::store::{token_digest, StoreResult, TokenVerifier};

/// Characters of the token used for the indexed lookup
const PREFIX_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct DbSessionToken {
    pub id: Uuid,
    pub user_id: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DbSessionToken {
    /// Active and not expired
    pub fn is_valid(&self) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires| expires > Utc::now())
    }
}

pub struct SessionTokenRepository {
    pool: DbPool,
}

impl SessionTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, token: &str) -> StoreResult<Option<DbSessionToken>> {
        let Some(prefix) = token.get(..PREFIX_LEN) else {
            return Ok(None);
        };
        let client = self.pool.get().await?;

        let row = client.query_opt(
            r#"
            SELECT id, user_id, is_active, expires_at
            FROM session_tokens
            WHERE token_prefix = $1 AND token_hash = $2
            "#,
            &[&prefix, &token_digest(token)]
        ).await?;

        Ok(row.map(|row| DbSessionToken {
            id: row.get("id"),
            user_id: row.get("user_id"),
            is_active: row.get("is_active"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Update last_used_at timestamp
    pub async fn touch(&self, id: Uuid) -> StoreResult<()> {
        let client = self.pool.get().await?;
        client.execute(
            "UPDATE session_tokens SET last_used_at = NOW() WHERE id = $1",
            &[&id]
        ).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for SessionTokenRepository {
    async fn verify(&self, token: &str) -> StoreResult<Option<String>> {
        let Some(found) = self.find(token).await? else {
            return Ok(None);
        };
        if !found.is_valid() {
            debug!(token_id = %found.id, "Rejected inactive or expired session token");
            return Ok(None);
        }

        let repo = SessionTokenRepository::new(self.pool.clone());
        let id = found.id;
        tokio::spawn(async move {
            if let Err(e) = repo.touch(id).await {
                warn!(token_id = %id, error = %e, "Failed to update token last_used_at");
            }
        });

        Ok(Some(found.user_id))
    }
}
