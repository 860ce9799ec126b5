//! # Order Info Core
//!
//! Model types, error taxonomy and capability traits for the order info
//! service.
//!
//! The service ingests order messages from a durable log, persists them as a
//! four-table aggregate (order, delivery, payment, items) and serves reads
//! through a cache-aside layer with keyset pagination. This crate holds the
//! pieces every other crate agrees on:
//!
//! - [`model`]: the `Order` aggregate and its wire format
//! - [`validation`]: business rules applied before a write
//! - [`error`]: the `NotFound` / `Storage` / `InvalidInput` / `Messaging` taxonomy
//! - [`repository`], [`cache`], [`handler`], [`message_log`]: the seams the
//!   pipeline and the orchestrator depend on, so storage, cache and log
//!   technology can be swapped without touching them
//!
//! ## Data flow
//!
//! ```text
//! message log ──► ingestion pipeline ──► OrderHandler ──► OrderRepository
//!                                                    └──► OrderCache
//!
//! read API ──► controller ──► OrderCache ──(miss)──► OrderRepository
//!                                  ▲                        │
//!                                  └──────── populate ──────┘
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod cache;
pub mod error;
pub mod handler;
pub mod message_log;
pub mod model;
pub mod repository;
pub mod validation;

pub use cache::OrderCache;
pub use error::{OrderError, Result};
pub use handler::OrderHandler;
pub use message_log::{LogMessage, MessageLog, MessageLogError};
pub use model::{Currency, Delivery, Item, Locale, Order, Payment};
pub use repository::OrderRepository;
pub use validation::{ValidationError, validate_order};

/// Boxed, sendable future returned by the capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// The dedup set timestamps processed messages with it, so tests can
    /// age entries without sleeping.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
