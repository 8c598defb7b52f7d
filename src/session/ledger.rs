//! Usage ledgers
//!
//! Anonymous visitors are counted locally from the client-held record.
//! Authenticated users observe their remote profile through a live
//! subscription. Ledgers only read; consumption goes through a
//! `Reservation` and the `UsageRecorder`.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{AnonymousData, LedgerSnapshot};
use crate::store::Subscription;

#[derive(Debug, Default)]
struct LocalCounter {
    used: u32,
    /// Reserved but not yet settled
    in_flight: u32,
    /// Job ids already counted
    recorded: HashSet<String>,
}

/// Counter for one anonymous visitor, seeded from the client record
#[derive(Debug)]
pub struct LocalCounterLedger {
    limit: u32,
    counter: Mutex<LocalCounter>,
}

impl LocalCounterLedger {
    pub fn new(data: AnonymousData, limit: u32) -> Self {
        Self {
            limit,
            counter: Mutex::new(LocalCounter {
                used: data.used,
                ..LocalCounter::default()
            }),
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(self.counter.lock().used, self.limit, None)
    }

    /// Hold one slot if `used + in_flight < limit`
    pub fn try_reserve(&self) -> bool {
        let mut counter = self.counter.lock();
        if counter.used.saturating_add(counter.in_flight) < self.limit {
            counter.in_flight += 1;
            true
        } else {
            false
        }
    }

    /// Drop a held slot, whether it was consumed or abandoned
    pub fn end_reservation(&self) {
        let mut counter = self.counter.lock();
        counter.in_flight = counter.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> u32 {
        self.counter.lock().in_flight
    }

    /// Count `job_id` once. Returns `false` if it was already counted.
    pub fn record_job(&self, job_id: &str) -> bool {
        let mut counter = self.counter.lock();
        if !counter.recorded.insert(job_id.to_string()) {
            return false;
        }
        counter.used = counter.used.saturating_add(1);
        true
    }

    /// Record to hand back to the client
    pub fn persisted(&self) -> AnonymousData {
        AnonymousData {
            used: self.counter.lock().used,
        }
    }
}

/// Live view of an authenticated profile
pub struct SubscribedLedger {
    subscription: Subscription,
}

impl SubscribedLedger {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// A user without a profile yet has nothing to spend
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.subscription
            .current()
            .map(|package| LedgerSnapshot::from(&package))
            .unwrap_or_default()
    }

    /// Next pushed snapshot; `None` once the subscription is gone
    pub async fn changed(&mut self) -> Option<LedgerSnapshot> {
        let profile = self.subscription.changed().await?;
        Some(profile.map(|p| LedgerSnapshot::from(&p)).unwrap_or_default())
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

pub enum UsageLedger {
    Local(Arc<LocalCounterLedger>),
    Subscribed(SubscribedLedger),
}

impl UsageLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        match self {
            UsageLedger::Local(ledger) => ledger.snapshot(),
            UsageLedger::Subscribed(ledger) => ledger.snapshot(),
        }
    }

    /// Stop receiving pushes. A local ledger has nothing to tear down.
    pub fn unsubscribe(self) {
        if let UsageLedger::Subscribed(ledger) = self {
            ledger.unsubscribe();
        }
    }
}
