//! Per-recipient cooldown tracking
//!
//! Remembers when each recipient last received a successful send so that
//! the dispatcher can refuse to message the same person twice inside the
//! configured window. Pure in-memory; nothing is persisted.

use courier_core::{Recipient, TimeSource, Timestamp};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Last successful send time per recipient
pub struct CooldownStore {
    entries: DashMap<Recipient, Timestamp>,
    window: Duration,
    time_source: Arc<dyn TimeSource>,
}

impl CooldownStore {
    /// Create a new store with the given resend floor
    pub fn new(window_ms: u64, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_millis(window_ms),
            time_source,
        }
    }

    /// Record a successful send at `timestamp`
    pub fn record_sent(&self, recipient: &Recipient, timestamp: Timestamp) {
        self.entries.insert(recipient.clone(), timestamp);
    }

    /// Time since the last recorded send, or `None` if never sent
    pub fn time_since_last(&self, recipient: &Recipient) -> Option<Duration> {
        let now = self.time_source.now();
        self.entries
            .get(recipient)
            .map(|entry| now.duration_since(*entry.value()))
    }

    /// Time left before `recipient` may be messaged again.
    ///
    /// Returns `None` when the recipient is immediately sendable: never
    /// recorded, or last sent at least one full window ago.
    pub fn remaining(&self, recipient: &Recipient) -> Option<Duration> {
        let elapsed = self.time_since_last(recipient)?;
        if elapsed < self.window {
            Some(self.window - elapsed)
        } else {
            None
        }
    }

    /// Drop records at least `older_than` old; returns how many were removed
    pub fn prune(&self, older_than: Duration) -> usize {
        let cutoff_ms = older_than.as_millis().min(u128::from(u64::MAX)) as u64;
        let now = self.time_source.now();
        let before = self.entries.len();
        self.entries.retain(|_, sent_at| now - *sent_at < cutoff_ms);
        before.saturating_sub(self.entries.len())
    }

    /// Drop every record whose cooldown has already lapsed
    pub fn prune_expired(&self) -> usize {
        self.prune(self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of recipients currently tracked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CooldownStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownStore")
            .field("window", &self.window)
            .field("tracked", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_harness::MockTimeSource;
    use courier_core::RecipientNormalizer;

    fn create_test_recipient(raw: &str) -> Recipient {
        RecipientNormalizer::default().normalize(raw).unwrap()
    }

    #[test]
    fn test_unknown_recipient_is_sendable() {
        let time = Arc::new(MockTimeSource::new(1_000_000));
        let store = CooldownStore::new(60_000, time);
        let recipient = create_test_recipient("9876543210");

        assert_eq!(store.time_since_last(&recipient), None);
        assert_eq!(store.remaining(&recipient), None);
    }

    #[test]
    fn test_window_boundary() {
        let time = Arc::new(MockTimeSource::new(1_000_000));
        let store = CooldownStore::new(60_000, time.clone());
        let recipient = create_test_recipient("9876543210");

        store.record_sent(&recipient, time.now());

        time.advance(Duration::from_millis(59_999));
        assert_eq!(store.remaining(&recipient), Some(Duration::from_millis(1)));

        time.advance(Duration::from_millis(1));
        assert_eq!(store.remaining(&recipient), None);
        assert_eq!(
            store.time_since_last(&recipient),
            Some(Duration::from_millis(60_000))
        );
    }

    #[test]
    fn test_normalized_forms_share_cooldown() {
        let time = Arc::new(MockTimeSource::new(1_000_000));
        let store = CooldownStore::new(60_000, time.clone());

        store.record_sent(&create_test_recipient("98765 43210"), time.now());
        assert!(store
            .remaining(&create_test_recipient("+91-98765-43210"))
            .is_some());
    }

    #[test]
    fn test_prune_removes_only_old_entries() {
        let time = Arc::new(MockTimeSource::new(1_000_000));
        let store = CooldownStore::new(60_000, time.clone());
        let old = create_test_recipient("1111111111");
        let fresh = create_test_recipient("2222222222");

        store.record_sent(&old, time.now());
        time.advance(Duration::from_millis(30_000));
        store.record_sent(&fresh, time.now());
        time.advance(Duration::from_millis(30_000));

        assert_eq!(store.prune_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.time_since_last(&old), None);
        assert!(store.remaining(&fresh).is_some());
    }
}
