//! Pending-result correlation table
//!
//! Matches inbound event results to the dispatch that produced them via
//! the event id. A waiter is registered *before* the envelope is
//! enqueued, so a reply can never arrive ahead of its table entry.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::proto::EventResult;
use crate::types::{Error, Result};

/// Per-process map from event id to a single-use receiver.
///
/// Invariant: at most one pending waiter per event id. Ids are never
/// reused while pending (dispatch allocates them from a monotonic
/// counter), so a duplicate registration is a programming bug.
#[derive(Debug, Default)]
pub struct PendingResults {
    entries: DashMap<u64, oneshot::Sender<EventResult>>,
}

impl PendingResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a waiter for an event id. Fails if one is already pending.
    pub fn register(&self, event_id: u64) -> Result<oneshot::Receiver<EventResult>> {
        let (tx, rx) = oneshot::channel();
        match self.entries.entry(event_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::DuplicateWaiter(event_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Route a result to its waiter. Returns false if no waiter is
    /// pending (late or unsolicited reply); the result is dropped.
    pub fn deliver(&self, result: EventResult) -> bool {
        match self.entries.remove(&result.event_id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Evict a waiter without delivering, after a timeout.
    pub fn discard(&self, event_id: u64) -> bool {
        self.entries.remove(&event_id).is_some()
    }

    /// Fail every outstanding waiter immediately. Dropping the senders
    /// resolves each receiver with a closed-channel error.
    pub fn fail_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_exactly_once() {
        let pending = PendingResults::new();
        let rx = pending.register(1).unwrap();

        assert!(pending.deliver(EventResult::cancelled(1)));
        // Second reply for the same id is a stray and is dropped.
        assert!(!pending.deliver(EventResult::new(1)));

        let res = rx.await.unwrap();
        assert!(res.cancel);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let pending = PendingResults::new();
        let _rx = pending.register(5).unwrap();
        assert!(matches!(
            pending.register(5),
            Err(Error::DuplicateWaiter(5))
        ));
    }

    #[tokio::test]
    async fn discarded_waiter_drops_late_reply() {
        let pending = PendingResults::new();
        let rx = pending.register(9).unwrap();

        assert!(pending.discard(9));
        assert!(!pending.deliver(EventResult::new(9)));
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn fail_all_resolves_waiters_with_error() {
        let pending = PendingResults::new();
        let rx1 = pending.register(1).unwrap();
        let rx2 = pending.register(2).unwrap();

        pending.fail_all();

        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn unsolicited_result_is_dropped() {
        let pending = PendingResults::new();
        assert!(!pending.deliver(EventResult::new(42)));
    }
}
