//! Processed-message keys, for redelivery detection within one process lifetime.

use chrono::{DateTime, Utc};
use order_info_core::environment::Clock;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Set of processed keys stamped with the time they were marked.
///
/// Not persisted: after a restart, redelivered messages are handled again
/// and the idempotent upsert absorbs them.
pub struct ProcessedKeys {
    clock: Arc<dyn Clock>,
    keys: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl ProcessedKeys {
    /// Empty set timestamped by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `key` was marked and not yet purged.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Mark `key` as processed now.
    pub fn mark(&self, key: String) {
        let now = self.clock.now();
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, now);
    }

    /// Drop keys marked more than `max_age` ago. Returns how many were dropped.
    pub fn purge(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return 0;
        };

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let before = keys.len();
        keys.retain(|_, marked_at| *marked_at >= cutoff);
        before - keys.len()
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for ProcessedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedKeys")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_info_testing::MockClock;

    #[test]
    fn marked_keys_are_remembered() {
        let keys = ProcessedKeys::new(Arc::new(MockClock::default()));
        assert!(!keys.contains("k_0_1"));

        keys.mark("k_0_1".to_string());
        assert!(keys.contains("k_0_1"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn purge_drops_only_keys_older_than_max_age() {
        let clock = Arc::new(MockClock::default());
        let keys = ProcessedKeys::new(clock.clone());

        keys.mark("old".to_string());
        clock.advance(chrono::Duration::minutes(20));
        keys.mark("new".to_string());
        clock.advance(chrono::Duration::minutes(15));

        let removed = keys.purge(Duration::from_secs(30 * 60));

        assert_eq!(removed, 1);
        assert!(!keys.contains("old"));
        assert!(keys.contains("new"));
    }

    #[test]
    fn clear_forgets_everything() {
        let keys = ProcessedKeys::new(Arc::new(MockClock::default()));
        keys.mark("a".to_string());
        keys.clear();
        assert!(keys.is_empty());
    }
}
