//! Ingestion pipeline: message log → validated order → write handler.
//!
//! Every polled message goes through
//!
//! ```text
//! received → deduplicated? → deserialized? → validated? → handled (retry loop) → committed
//! ```
//!
//! and its offset is committed once it reaches a terminal disposition, in
//! receive order. Nothing is left uncommitted on purpose except on shutdown:
//! malformed and invalid messages are dropped, and a message whose retries run
//! out is committed anyway. A message whose handling is interrupted by
//! cancellation keeps its offset and is redelivered after a restart.

use crate::dedup::ProcessedKeys;
use crate::metrics::PipelineMetrics;
use crate::retry::RetryPolicy;
use order_info_core::environment::{Clock, SystemClock};
use order_info_core::message_log::{LogMessage, MessageLog};
use order_info_core::model::Order;
use order_info_core::{OrderError, OrderHandler, Result, validate_order};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Backoff schedule; `max_retries` bounds the attempts per message.
    pub retry_policy: RetryPolicy,
    /// Upper bound for one handler attempt.
    pub handler_timeout: Duration,
    /// Upper bound for one poll.
    pub poll_timeout: Duration,
    /// How often old processed keys are purged.
    pub cleanup_interval: Duration,
    /// Age after which a processed key is purged.
    pub max_age: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            handler_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_millis(100),
            cleanup_interval: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(30 * 60),
        }
    }
}

/// Terminal disposition of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Handled and committed.
    Processed,
    /// Already processed in this process lifetime; committed and skipped.
    Duplicate,
    /// Payload is not an order; committed and dropped.
    Malformed,
    /// Order failed validation; committed and dropped.
    Invalid,
    /// Handler failed permanently; committed.
    Rejected,
    /// Handler kept failing temporarily; committed after the last attempt.
    Exhausted,
    /// Shutdown interrupted handling; left uncommitted.
    Cancelled,
}

impl Outcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Duplicate => "duplicate",
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::Rejected => "rejected",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Drives messages from a [`MessageLog`] into an [`OrderHandler`].
pub struct IngestionPipeline {
    log: Arc<dyn MessageLog>,
    handler: Arc<dyn OrderHandler>,
    processed: Arc<ProcessedKeys>,
    config: PipelineConfig,
    shutdown: CancellationToken,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionPipeline {
    /// Create a pipeline using wall-clock time for the processed-key set.
    #[must_use]
    pub fn new(
        log: Arc<dyn MessageLog>,
        handler: Arc<dyn OrderHandler>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_clock(log, handler, config, Arc::new(SystemClock))
    }

    /// Create a pipeline with an explicit clock.
    #[must_use]
    pub fn with_clock(
        log: Arc<dyn MessageLog>,
        handler: Arc<dyn OrderHandler>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log,
            handler,
            processed: Arc::new(ProcessedKeys::new(clock)),
            config,
            shutdown: CancellationToken::new(),
            cleanup_task: Mutex::new(None),
        }
    }

    /// The processed-key set.
    #[must_use]
    pub fn processed(&self) -> &ProcessedKeys {
        &self.processed
    }

    /// Consume until `cancel` fires.
    ///
    /// Cancellation stops polling and interrupts a handler attempt or backoff
    /// in progress; the interrupted message is left uncommitted. Poll errors
    /// and processing failures are logged and the loop continues.
    pub async fn run(&self, cancel: CancellationToken) {
        self.start_cleanup();
        tracing::info!("Ingestion pipeline started");

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                polled = self.log.poll(self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => {}
                Ok(Some(message)) => {
                    if let Err(e) = self.process(&message, &cancel).await {
                        tracing::error!(
                            key = %message.key_str(),
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Failed to process message"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Message log poll failed");
                }
            }
        }

        tracing::info!("Ingestion pipeline shutting down");
    }

    /// Carry one message to its terminal disposition.
    ///
    /// # Errors
    ///
    /// - the handler's error when it failed permanently or ran out of retries
    ///   (the message is committed in both cases)
    /// - `Messaging` when the offset could not be committed after a drop or a
    ///   handler result
    ///
    /// Handling is interrupted by [`close`](Self::close).
    pub async fn process_message(&self, message: &LogMessage) -> Result<Outcome> {
        self.process(message, &self.shutdown).await
    }

    async fn process(&self, message: &LogMessage, cancel: &CancellationToken) -> Result<Outcome> {
        let processed_key = message.processed_key();

        if self.processed.contains(&processed_key) {
            tracing::debug!(
                processed_key,
                partition = message.partition,
                offset = message.offset,
                "Skipping already processed message"
            );
            if let Err(e) = self.log.commit(message).await {
                tracing::error!(processed_key, error = %e, "Failed to commit duplicate message");
            }
            PipelineMetrics::record_duplicate();
            PipelineMetrics::record_outcome(Outcome::Duplicate.as_str());
            return Ok(Outcome::Duplicate);
        }

        let order: Order = match serde_json::from_slice(message.payload.as_deref().unwrap_or_default()) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(
                    key = %message.key_str(),
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Failed to deserialize message into an order"
                );
                return self.drop_message(message, Outcome::Malformed).await;
            }
        };

        if let Err(e) = validate_order(&order) {
            tracing::warn!(
                key = %message.key_str(),
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Order validation failed"
            );
            return self.drop_message(message, Outcome::Invalid).await;
        }

        self.handle_with_retry(message, processed_key, &order, cancel)
            .await
    }

    /// Stop the cleanup task, interrupt handling, forget processed keys and
    /// close the log.
    ///
    /// # Errors
    ///
    /// Returns `Messaging` if the log cannot be closed cleanly.
    pub fn close(&self) -> Result<()> {
        tracing::info!("Closing ingestion pipeline");

        self.shutdown.cancel();
        if let Some(task) = self
            .cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.processed.clear();

        self.log.close().map_err(OrderError::from)
    }

    async fn handle_with_retry(
        &self,
        message: &LogMessage,
        processed_key: String,
        order: &Order,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let policy = &self.config.retry_policy;
        let mut last_error = None;

        for attempt in 0..policy.max_attempts() {
            if attempt > 0 {
                let backoff = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    order_uid = %order.order_uid,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    "Retrying message after error"
                );
                PipelineMetrics::record_retry();
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(abandon(message, order, attempt)),
                    () = tokio::time::sleep(backoff) => {}
                }
            }

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(abandon(message, order, attempt)),
                result = self.attempt(order) => result,
            };

            match result {
                Ok(()) => {
                    self.commit(message, "after handling").await?;
                    self.processed.mark(processed_key);
                    PipelineMetrics::record_outcome(Outcome::Processed.as_str());
                    tracing::info!(
                        order_uid = %order.order_uid,
                        partition = message.partition,
                        offset = message.offset,
                        "Message successfully processed"
                    );
                    return Ok(Outcome::Processed);
                }
                Err(e) if e.is_temporary() => {
                    tracing::warn!(
                        order_uid = %order.order_uid,
                        attempt,
                        max_retries = policy.max_retries,
                        error = %e,
                        "Handler error"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::error!(
                        order_uid = %order.order_uid,
                        attempt,
                        error = %e,
                        "Permanent handler error, committing offset and skipping message"
                    );
                    self.commit(message, "after permanent handler error").await?;
                    self.processed.mark(processed_key);
                    PipelineMetrics::record_outcome(Outcome::Rejected.as_str());
                    return Err(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| OrderError::Storage("no handler attempt was made".to_string()));
        tracing::error!(
            order_uid = %order.order_uid,
            error = %error,
            "All retries exhausted, committing offset and skipping message"
        );
        self.commit(message, "after exhausting retries").await?;
        self.processed.mark(processed_key);
        PipelineMetrics::record_outcome(Outcome::Exhausted.as_str());
        Err(error)
    }

    async fn attempt(&self, order: &Order) -> Result<()> {
        let timeout = self.config.handler_timeout;
        tokio::time::timeout(timeout, self.handler.handle(order))
            .await
            .unwrap_or_else(|_| {
                Err(OrderError::Storage(format!(
                    "handler timed out after {}ms",
                    timeout.as_millis()
                )))
            })
    }

    async fn drop_message(&self, message: &LogMessage, outcome: Outcome) -> Result<Outcome> {
        self.commit(message, "after dropping message").await?;
        PipelineMetrics::record_outcome(outcome.as_str());
        tracing::info!(
            key = %message.key_str(),
            outcome = outcome.as_str(),
            "Committed offset and skipped message"
        );
        Ok(outcome)
    }

    async fn commit(&self, message: &LogMessage, context: &str) -> Result<()> {
        self.log.commit(message).await.map_err(|e| {
            tracing::error!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset {context}"
            );
            OrderError::from(e)
        })
    }

    fn start_cleanup(&self) {
        let interval = self.config.cleanup_interval;
        if interval.is_zero() {
            tracing::warn!("Cleanup interval is zero, processed keys are never purged");
            return;
        }

        let mut slot = self
            .cleanup_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }

        let processed = Arc::clone(&self.processed);
        let token = self.shutdown.clone();
        let max_age = self.config.max_age;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = processed.purge(max_age);
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = processed.len(),
                                max_age_secs = max_age.as_secs(),
                                "Processed keys cleaned"
                            );
                        }
                    }
                }
            }
        }));
    }
}

fn abandon(message: &LogMessage, order: &Order, attempt: usize) -> Outcome {
    tracing::warn!(
        order_uid = %order.order_uid,
        partition = message.partition,
        offset = message.offset,
        attempt,
        "Shutdown during handling, leaving offset uncommitted"
    );
    PipelineMetrics::record_outcome(Outcome::Cancelled.as_str());
    Outcome::Cancelled
}
