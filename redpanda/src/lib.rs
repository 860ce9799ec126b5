//! Kafka-compatible message log for the order info service.
//!
//! - [`RedpandaMessageLog`]: a single-topic consumer implementing
//!   [`MessageLog`](order_info_core::MessageLog) with manual offset commits
//! - [`RedpandaOrderPublisher`]: a producer writing orders as JSON, keyed by
//!   order identifier
//!
//! Both use rdkafka, so any Kafka-protocol broker works (Redpanda, Apache
//! Kafka, MSK).
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - `enable.auto.commit` is off; the ingestion pipeline commits each message
//!   after it reaches a terminal disposition
//! - If the process crashes before a commit, the message is redelivered
//! - Ordering is guaranteed within a partition
//!
//! # Example
//!
//! ```no_run
//! use order_info_redpanda::RedpandaMessageLog;
//! use order_info_core::MessageLog;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = RedpandaMessageLog::builder()
//!     .brokers("localhost:9092")
//!     .group_id("order-info-service")
//!     .topic("orders")
//!     .build()?;
//!
//! if let Some(message) = log.poll(Duration::from_millis(100)).await? {
//!     log.commit(&message).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod consumer;
mod publisher;

pub use consumer::{RedpandaMessageLog, RedpandaMessageLogBuilder};
pub use publisher::{PublishError, RedpandaOrderPublisher};
