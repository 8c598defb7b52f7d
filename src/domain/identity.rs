//! Caller identity used to key usage accounting

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether the caller is signed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Visitor identified only by a client-held token
    Anonymous,
    /// Signed-in user with a stable user id
    Authenticated,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKind::Anonymous => write!(f, "anonymous"),
            IdentityKind::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Resolved caller. Exactly one is active per session and its kind never
/// changes once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub kind: IdentityKind,
    pub id: String,
}

impl Identity {
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Anonymous,
            id: id.into(),
        }
    }

    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            kind: IdentityKind::Authenticated,
            id: id.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.kind == IdentityKind::Authenticated
    }
}
