//! Per-request usage session and the removal flow built on it
//!
//! A `Session` binds one resolved identity to its ledger for the lifetime
//! of a request. Shared services (stores, job service) live in the
//! application state; nothing here is global.

pub mod flow;
pub mod identity;
pub mod ledger;
pub mod poller;
pub mod provisioner;
pub mod recorder;
pub mod reservation;
pub mod submitter;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::{AnonymousData, Identity, IdentityKind};
use crate::store::{ProfileStore, StoreError};

pub use flow::{RemovalError, RemovalFlow, RemovalOutcome};
pub use identity::{IdentityError, IdentityResolver, IdentityState, Resolution};
pub use ledger::{LocalCounterLedger, SubscribedLedger, UsageLedger};
pub use poller::{JobPoller, PollError, PollPolicy};
pub use provisioner::ProfileProvisioner;
pub use recorder::{RecordOutcome, UsageRecorder};
pub use reservation::Reservation;
pub use submitter::{JobSubmitter, SubmissionError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Identity is still being resolved")]
    Unresolved,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identity plus ledger for one request
pub struct Session {
    identity: Identity,
    ledger: UsageLedger,
}

impl Session {
    /// Open a session for a resolved identity. Anonymous sessions are seeded
    /// from the client record; authenticated sessions subscribe to the
    /// remote profile.
    pub async fn open(
        state: &IdentityState,
        anonymous: AnonymousData,
        free_limit: u32,
        profiles: &dyn ProfileStore,
    ) -> Result<Self, SessionError> {
        let identity = state.resolved().ok_or(SessionError::Unresolved)?.clone();

        let ledger = match identity.kind {
            IdentityKind::Anonymous => {
                UsageLedger::Local(Arc::new(LocalCounterLedger::new(anonymous, free_limit)))
            }
            IdentityKind::Authenticated => {
                UsageLedger::Subscribed(SubscribedLedger::new(profiles.subscribe(&identity.id).await?))
            }
        };

        debug!(identity = %identity.id, kind = %identity.kind, "Session opened");
        Ok(Self { identity, ledger })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Anonymous record to persist on the client, if this is an anonymous session
    pub fn anonymous_record(&self) -> Option<AnonymousData> {
        match &self.ledger {
            UsageLedger::Local(ledger) => Some(ledger.persisted()),
            UsageLedger::Subscribed(_) => None,
        }
    }

    /// Hand the ledger to a longer-lived consumer such as a live feed
    pub fn into_ledger(self) -> UsageLedger {
        self.ledger
    }

    /// End the session, tearing down any subscription
    pub fn close(self) {
        debug!(identity = %self.identity.id, "Session closed");
        self.ledger.unsubscribe();
    }
}
