//! Notification fan-out for issue-store mutations.
//!
//! Subscribers receive consistent snapshots of the active set and history
//! after every mutation. Delivery is best-effort: one subscriber's failure
//! is logged and never fails the pipeline or other subscribers.

use std::sync::RwLock;

use tracing::warn;

use crate::heal::{HistoryEntry, Issue};

/// Callback invoked after every issue-store mutation.
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;
    fn on_change(&self, active: &[Issue], history: &[HistoryEntry]) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct SubscriberSet {
    subscribers: RwLock<Vec<Box<dyn Subscriber>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Box<dyn Subscriber>) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(subscriber);
    }

    /// Fan out to every registered subscriber.
    pub fn notify(&self, active: &[Issue], history: &[HistoryEntry]) {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            if let Err(e) = subscriber.on_change(active, history) {
                warn!(subscriber = subscriber.name(), error = %e, "subscriber failed");
            }
        }
    }
}
