//! Message log abstraction consumed by the ingestion pipeline.
//!
//! The pipeline only needs three capabilities from the log: poll one message
//! with a bounded wait, commit a message's offset, and release the
//! connection. Offsets are always committed manually, after the message
//! reaches a terminal disposition.
//!
//! # Implementations
//!
//! - `RedpandaMessageLog` (in `order-info-redpanda`): Kafka-compatible consumer
//! - `InMemoryMessageLog` (in `order-info-testing`): scripted, records commits

use crate::BoxFuture;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

/// Errors from the message log.
///
/// A poll that simply times out is not an error; see [`MessageLog::poll`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageLogError {
    /// Could not create the client.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Could not subscribe to the topic.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Receiving a message failed.
    #[error("poll failed: {0}")]
    Poll(String),

    /// Committing an offset failed.
    #[error("commit failed: {0}")]
    Commit(String),

    /// Releasing the connection failed.
    #[error("close failed: {0}")]
    Close(String),
}

/// One message as delivered by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Message key, if any.
    pub key: Option<Vec<u8>>,
    /// Message value, if any.
    pub payload: Option<Vec<u8>>,
    /// Partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
}

impl LogMessage {
    /// Message key as text (lossy), empty when absent.
    #[must_use]
    pub fn key_str(&self) -> Cow<'_, str> {
        self.key
            .as_deref()
            .map_or(Cow::Borrowed(""), String::from_utf8_lossy)
    }

    /// Key used to detect redelivery within one process lifetime.
    #[must_use]
    pub fn processed_key(&self) -> String {
        format!("{}_{}_{}", self.key_str(), self.partition, self.offset)
    }
}

/// A consumer subscribed to a single topic with manual offset commits.
pub trait MessageLog: Send + Sync {
    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when the wait elapses without a message.
    ///
    /// # Errors
    ///
    /// Returns [`MessageLogError::Poll`] when the broker reports an error.
    fn poll(
        &self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<LogMessage>, MessageLogError>>;

    /// Commit `message`'s offset so it is not delivered again to this group.
    ///
    /// # Errors
    ///
    /// Returns [`MessageLogError::Commit`] when the commit is rejected.
    fn commit<'a>(&'a self, message: &'a LogMessage) -> BoxFuture<'a, Result<(), MessageLogError>>;

    /// Release the connection. Further polls return errors.
    ///
    /// # Errors
    ///
    /// Returns [`MessageLogError::Close`] when the client cannot be shut down cleanly.
    fn close(&self) -> Result<(), MessageLogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: Option<&str>) -> LogMessage {
        LogMessage {
            topic: "orders".to_string(),
            key: key.map(|k| k.as_bytes().to_vec()),
            payload: None,
            partition: 3,
            offset: 42,
        }
    }

    #[test]
    fn processed_key_combines_key_partition_and_offset() {
        assert_eq!(message(Some("order-1")).processed_key(), "order-1_3_42");
    }

    #[test]
    fn processed_key_without_key() {
        assert_eq!(message(None).processed_key(), "_3_42");
    }
}
