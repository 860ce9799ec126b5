//! # Order Info Testing
//!
//! Test doubles and fixtures for the order info service.
//!
//! This crate provides:
//! - [`InMemoryOrderRepository`]: deterministic store with call counters and
//!   injectable failures
//! - [`InMemoryMessageLog`]: scripted message log that records commits
//! - [`MockClock`]: controllable time for the dedup set
//! - [`fixtures`]: valid sample orders and log messages
//! - [`properties`]: proptest strategies for pagination tests
//!
//! ## Example
//!
//! ```
//! use order_info_core::OrderRepository;
//! use order_info_testing::{InMemoryOrderRepository, sample_order};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repo = InMemoryOrderRepository::new();
//! let stored = repo.upsert_order(&sample_order("abc123", 2)).await.unwrap();
//!
//! assert_eq!(stored.items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2]);
//! assert_eq!(repo.upsert_calls(), 1);
//! # }
//! ```

use chrono::{DateTime, Utc};
use order_info_core::environment::Clock;

pub mod fixtures;
pub mod message_log;
pub mod repository;

pub use fixtures::{order_message, sample_order};
pub use message_log::InMemoryMessageLog;
pub use repository::InMemoryOrderRepository;

/// Mock implementations of [`Clock`].
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Clock that only moves when told to.
    ///
    /// Used to age processed-message keys past their max age without sleeping.
    #[derive(Debug)]
    pub struct MockClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl MockClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(test_time())
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Test helpers.
pub mod helpers {
    /// Route `tracing` output through the test harness writer.
    ///
    /// Safe to call from every test; only the first call installs a subscriber.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use order_info_core::model::Item;
    use proptest::prelude::*;

    use crate::fixtures::sample_item;

    /// Items with strictly increasing, gapped ids, as the store would assign
    /// them after deletes and replays.
    pub fn arb_items(max_len: usize) -> impl Strategy<Value = Vec<Item>> {
        prop::collection::vec(1_i64..5, 0..=max_len).prop_map(|gaps| {
            let mut id = 0;
            gaps.into_iter()
                .enumerate()
                .map(|(i, gap)| {
                    id += gap;
                    let mut item = sample_item(i);
                    item.id = id;
                    item
                })
                .collect()
        })
    }
}

pub use mocks::MockClock;
