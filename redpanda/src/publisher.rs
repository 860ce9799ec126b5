//! Order producer.

use order_info_core::model::Order;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use thiserror::Error;

/// Errors from publishing orders.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Could not create the producer.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The order could not be encoded.
    #[error("failed to serialize order {order_uid}: {reason}")]
    Serialization {
        /// The order
        order_uid: String,
        /// The reason for failure
        reason: String,
    },

    /// The broker did not accept the message.
    #[error("failed to publish to topic '{topic}': {reason}")]
    Send {
        /// The topic
        topic: String,
        /// The reason for failure
        reason: String,
    },
}

/// Writes orders to a topic as JSON, keyed by `order_uid`.
///
/// Keying by identifier sends every version of an order to the same
/// partition, so the consumer sees them in order.
pub struct RedpandaOrderPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl RedpandaOrderPublisher {
    /// Create a producer for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectionFailed`] if the client cannot be created.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        Ok(Self {
            producer,
            topic: topic.into(),
            timeout: Duration::from_secs(5),
        })
    }

    /// Set the send timeout (default 5 seconds).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish one order. Returns the partition and offset it was written to.
    ///
    /// # Errors
    ///
    /// - [`PublishError::Serialization`]: the order cannot be encoded
    /// - [`PublishError::Send`]: the broker rejected the message or timed out
    pub async fn publish(&self, order: &Order) -> Result<(i32, i64), PublishError> {
        let payload = serde_json::to_vec(order).map_err(|e| PublishError::Serialization {
            order_uid: order.order_uid.clone(),
            reason: e.to_string(),
        })?;

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&order.order_uid);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    partition,
                    offset,
                    order_uid = %order.order_uid,
                    "Order published"
                );
                Ok((partition, offset))
            }
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = %self.topic,
                    order_uid = %order.order_uid,
                    error = %kafka_error,
                    "Failed to publish order"
                );
                Err(PublishError::Send {
                    topic: self.topic.clone(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedpandaOrderPublisher>();
    }
}
