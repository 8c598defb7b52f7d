//! Caller identity resolution
//!
//! A bearer session token wins and is never downgraded to anonymous when
//! invalid. Without one, the `anonymous_id` cookie identifies the visitor;
//! a fresh id is minted on the first visit.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::domain::Identity;
use crate::store::{StoreError, TokenVerifier};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identity as seen by request handlers. Nothing may be admitted or
/// submitted while it is still `Loading`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Loading,
    Resolved(Identity),
}

impl IdentityState {
    pub fn resolved(&self) -> Option<&Identity> {
        match self {
            IdentityState::Resolved(identity) => Some(identity),
            IdentityState::Loading => None,
        }
    }
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    /// A new anonymous id was created and must be persisted by the client
    pub minted: bool,
}

#[derive(Clone)]
pub struct IdentityResolver {
    verifier: Arc<dyn TokenVerifier>,
}

impl IdentityResolver {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn resolve(
        &self,
        bearer: Option<&str>,
        anonymous_id: Option<&str>,
    ) -> Result<Resolution, IdentityError> {
        if let Some(token) = bearer {
            let user_id = self.verifier
                .verify(token)
                .await?
                .ok_or(IdentityError::InvalidToken)?;
            debug!(user_id = %user_id, "Resolved authenticated identity");
            return Ok(Resolution {
                identity: Identity::authenticated(user_id),
                minted: false,
            });
        }

        match anonymous_id.and_then(|raw| Uuid::parse_str(raw).ok()) {
            Some(id) => Ok(Resolution {
                identity: Identity::anonymous(id.to_string()),
                minted: false,
            }),
            None => {
                let id = Uuid::new_v4().to_string();
                debug!(anonymous_id = %id, "Minted anonymous identity");
                Ok(Resolution {
                    identity: Identity::anonymous(id),
                    minted: true,
                })
            }
        }
    }
}
