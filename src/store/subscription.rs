//! Live profile subscriptions
//!
//! One `watch` channel per watched user id. Stores publish after every
//! change, tagged with a revision that only grows per user; a publish or
//! seed older than what the topic holds is dropped, so subscribers never
//! move backwards. A topic disappears with its last subscriber so nothing
//! is published for users nobody watches.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::domain::ProfilePackage;

struct Topic {
    sender: watch::Sender<Option<ProfilePackage>>,
    revision: u64,
    subscribers: usize,
}

impl Topic {
    /// Replace the held profile if `revision` is newer
    fn advance(&mut self, revision: u64, profile: Option<ProfilePackage>) -> bool {
        if revision <= self.revision {
            return false;
        }
        self.revision = revision;
        self.sender.send_replace(profile);
        true
    }
}

/// Fan-out point shared by a store and its subscriptions
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    topics: Arc<DashMap<String, Topic>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. `current` is the profile as loaded at
    /// `revision`; it seeds a new topic and only replaces the state of an
    /// existing one when it is newer.
    pub fn subscribe(&self, user_id: &str, revision: u64, current: Option<ProfilePackage>) -> Subscription {
        let receiver = {
            let mut topic = self.topics.entry(user_id.to_string()).or_insert_with(|| Topic {
                sender: watch::channel(None).0,
                revision: 0,
                subscribers: 0,
            });
            topic.subscribers += 1;
            topic.advance(revision, current);
            topic.sender.subscribe()
        };

        debug!(user_id, subscribers = self.subscriber_count(user_id), "Profile subscription opened");

        Subscription {
            user_id: user_id.to_string(),
            hub: self.clone(),
            receiver,
            active: true,
        }
    }

    /// Push the profile state at `revision`. Returns `false` when nobody is
    /// watching or the topic already holds a newer state.
    pub fn publish(&self, user_id: &str, revision: u64, profile: Option<ProfilePackage>) -> bool {
        match self.topics.get_mut(user_id) {
            Some(mut topic) => {
                let applied = topic.advance(revision, profile);
                if !applied {
                    debug!(user_id, revision, held = topic.revision, "Dropped stale profile publish");
                }
                applied
            }
            None => false,
        }
    }

    pub fn is_watched(&self, user_id: &str) -> bool {
        self.topics.contains_key(user_id)
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.topics.get(user_id).map(|t| t.subscribers).unwrap_or(0)
    }

    fn release(&self, user_id: &str) {
        if let Entry::Occupied(mut topic) = self.topics.entry(user_id.to_string()) {
            let remaining = {
                let t = topic.get_mut();
                t.subscribers = t.subscribers.saturating_sub(1);
                t.subscribers
            };
            if remaining == 0 {
                topic.remove();
            }
        }
        debug!(user_id, "Profile subscription closed");
    }
}

/// Handle on a live profile. Dropping it unsubscribes.
pub struct Subscription {
    user_id: String,
    hub: SubscriptionHub,
    receiver: watch::Receiver<Option<ProfilePackage>>,
    active: bool,
}

impl Subscription {
    /// Latest known profile (`None` until the profile exists)
    pub fn current(&self) -> Option<ProfilePackage> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next pushed change. `None` once unsubscribed.
    pub async fn changed(&mut self) -> Option<Option<ProfilePackage>> {
        if !self.active {
            return None;
        }
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if std::mem::take(&mut self.active) {
            self.hub.release(&self.user_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}
