//! Single-topic consumer with manual commits.

use order_info_core::BoxFuture;
use order_info_core::message_log::{LogMessage, MessageLog, MessageLogError};
use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Kafka-protocol consumer subscribed to one topic.
///
/// # Configuration
///
/// - **Brokers**, **group id** and **topic** are required
/// - **Offset reset**: where a new group starts (default: `"earliest"`)
/// - **Session timeout** (default 10s), **heartbeat interval** (default 3s),
///   **max poll interval** (default 5m)
///
/// `enable.auto.commit` is always off.
pub struct RedpandaMessageLog {
    consumer: Arc<StreamConsumer>,
    topic: String,
    group_id: String,
    closed: AtomicBool,
}

impl RedpandaMessageLog {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> RedpandaMessageLogBuilder {
        RedpandaMessageLogBuilder::default()
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The consumer group.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

/// Builder for a [`RedpandaMessageLog`].
///
/// # Example
///
/// ```no_run
/// use order_info_redpanda::RedpandaMessageLog;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let log = RedpandaMessageLog::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .group_id("order-info-service")
///     .topic("orders")
///     .auto_offset_reset("latest")
///     .session_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Clone)]
pub struct RedpandaMessageLogBuilder {
    brokers: Option<String>,
    group_id: Option<String>,
    topic: Option<String>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    max_poll_interval: Option<Duration>,
}

impl RedpandaMessageLogBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group.
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the topic to subscribe to.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set where a group without committed offsets starts reading:
    /// `"earliest"`, `"latest"` or `"error"`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the group session timeout.
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set the maximum time between polls before the consumer leaves the group.
    #[must_use]
    pub const fn max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = Some(interval);
        self
    }

    /// Create the consumer and subscribe to the topic.
    ///
    /// # Errors
    ///
    /// - [`MessageLogError::ConnectionFailed`]: a required setting is missing
    ///   or the client cannot be created
    /// - [`MessageLogError::SubscriptionFailed`]: the subscription is rejected
    pub fn build(self) -> Result<RedpandaMessageLog, MessageLogError> {
        let brokers = required(self.brokers, "brokers")?;
        let group_id = required(self.group_id, "group id")?;
        let topic = required(self.topic, "topic")?;
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());
        let session_timeout = self.session_timeout.unwrap_or(Duration::from_secs(10));
        let heartbeat_interval = self.heartbeat_interval.unwrap_or(Duration::from_secs(3));
        let max_poll_interval = self.max_poll_interval.unwrap_or(Duration::from_secs(300));

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", session_timeout.as_millis().to_string())
            .set("heartbeat.interval.ms", heartbeat_interval.as_millis().to_string())
            .set("max.poll.interval.ms", max_poll_interval.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                MessageLogError::ConnectionFailed(format!("Failed to create consumer: {e}"))
            })?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| MessageLogError::SubscriptionFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            group_id = %group_id,
            auto_offset_reset = %auto_offset_reset,
            manual_commit = true,
            "Subscribed to topic"
        );

        Ok(RedpandaMessageLog {
            consumer: Arc::new(consumer),
            topic,
            group_id,
            closed: AtomicBool::new(false),
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, MessageLogError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MessageLogError::ConnectionFailed(format!("{name} not configured")))
}

fn detach(message: &BorrowedMessage<'_>) -> LogMessage {
    LogMessage {
        topic: message.topic().to_string(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec),
        partition: message.partition(),
        offset: message.offset(),
    }
}

impl MessageLog for RedpandaMessageLog {
    fn poll(
        &self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<LogMessage>, MessageLogError>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(MessageLogError::Poll("consumer is closed".to_string()));
            }

            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_elapsed) => Ok(None),
                Ok(Ok(message)) => {
                    let message = detach(&message);
                    tracing::trace!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        "Received message"
                    );
                    Ok(Some(message))
                }
                Ok(Err(e)) => Err(MessageLogError::Poll(e.to_string())),
            }
        })
    }

    fn commit<'a>(&'a self, message: &'a LogMessage) -> BoxFuture<'a, Result<(), MessageLogError>> {
        Box::pin(async move {
            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(
                    &message.topic,
                    message.partition,
                    Offset::Offset(message.offset + 1),
                )
                .map_err(|e| MessageLogError::Commit(e.to_string()))?;

            let consumer = Arc::clone(&self.consumer);
            tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
                .await
                .map_err(|e| MessageLogError::Commit(format!("commit task failed: {e}")))?
                .map_err(|e| MessageLogError::Commit(e.to_string()))?;

            tracing::trace!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Offset committed"
            );
            Ok(())
        })
    }

    fn close(&self) -> Result<(), MessageLogError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(topic = %self.topic, group_id = %self.group_id, "Closing consumer");
        self.consumer.unsubscribe();
        Ok(())
    }
}
