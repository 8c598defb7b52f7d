//! Quota reservations
//!
//! A credit is held between the gate check and the job's outcome. It is
//! confirmed on success and released on every other path, including the
//! request future being dropped.

use std::sync::Arc;
use tracing::{debug, warn};

use super::ledger::{LocalCounterLedger, UsageLedger};
use super::Session;
use crate::store::{ProfileStore, StoreResult};

enum Hold {
    Local(Arc<LocalCounterLedger>),
    Remote {
        store: Arc<dyn ProfileStore>,
        user_id: String,
    },
}

/// One held credit. Dropping it unsettled releases the credit.
#[must_use = "an unsettled reservation is released on drop"]
pub struct Reservation {
    hold: Option<Hold>,
}

impl Reservation {
    /// Hold one credit for the session's identity. `None` when the quota is
    /// already spent, possibly by a concurrent job.
    pub async fn acquire(
        session: &Session,
        profiles: &Arc<dyn ProfileStore>,
    ) -> StoreResult<Option<Reservation>> {
        let hold = match session.ledger() {
            UsageLedger::Local(ledger) => {
                if !ledger.try_reserve() {
                    return Ok(None);
                }
                Hold::Local(Arc::clone(ledger))
            }
            UsageLedger::Subscribed(_) => {
                let user_id = session.identity().id.clone();
                if !profiles.try_reserve_credit(&user_id).await? {
                    return Ok(None);
                }
                Hold::Remote {
                    store: Arc::clone(profiles),
                    user_id,
                }
            }
        };

        debug!(identity = %session.identity().id, "Credit reserved");
        Ok(Some(Reservation { hold: Some(hold) }))
    }

    /// Keep the credit consumed. For a local hold the counter itself is
    /// advanced by the recorder, so only the in-flight slot is dropped.
    pub fn confirm(mut self) {
        if let Some(Hold::Local(ledger)) = self.hold.take() {
            ledger.end_reservation();
        }
    }

    /// Give the credit back
    pub async fn release(mut self) {
        if let Some(hold) = self.hold.take() {
            release_hold(hold).await;
        }
    }
}

async fn release_hold(hold: Hold) {
    match hold {
        Hold::Local(ledger) => ledger.end_reservation(),
        Hold::Remote { store, user_id } => {
            match store.release_credit(&user_id).await {
                Ok(()) => debug!(user_id = %user_id, "Credit released"),
                Err(e) => warn!(user_id = %user_id, error = %e, "Failed to release credit"),
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let Some(hold) = self.hold.take() else {
            return;
        };
        match hold {
            Hold::Local(ledger) => ledger.end_reservation(),
            remote => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(release_hold(remote));
                }
                Err(_) => warn!("Reservation dropped outside a runtime; credit not released"),
            },
        }
    }
}
