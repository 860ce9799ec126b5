//! Prometheus metrics for the ingestion pipeline, the cache and the store.
//!
//! # Example
//!
//! ```rust,no_run
//! use order_info_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.install()?;
//!
//! // Served by the HTTP API on GET /metrics
//! let text = server.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Owner of the global Prometheus recorder.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an uninstalled server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle, so [`render`](Self::render)
    /// returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "order_pipeline_messages_total",
        "Messages that reached a terminal disposition, by outcome"
    );
    describe_counter!(
        "order_pipeline_retries_total",
        "Handler attempts after the first one"
    );
    describe_counter!(
        "order_pipeline_duplicates_total",
        "Redelivered messages skipped by the processed-key set"
    );
    describe_counter!("order_cache_hits_total", "Reads served from the local cache");
    describe_counter!(
        "order_cache_misses_total",
        "Reads that fell through to the aggregate store"
    );
    describe_counter!(
        "order_store_upserts_total",
        "Aggregate writes, by kind (insert or replace)"
    );
    describe_histogram!(
        "order_store_upsert_duration_seconds",
        "Time taken to write one order aggregate"
    );
}

/// Ingestion pipeline metrics recorder.
pub struct PipelineMetrics;

impl PipelineMetrics {
    /// Record a terminal disposition.
    pub fn record_outcome(outcome: &'static str) {
        counter!("order_pipeline_messages_total", "outcome" => outcome).increment(1);
    }

    /// Record a retry attempt.
    pub fn record_retry() {
        counter!("order_pipeline_retries_total").increment(1);
    }

    /// Record a skipped duplicate.
    pub fn record_duplicate() {
        counter!("order_pipeline_duplicates_total").increment(1);
    }
}

/// Cache metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a read served from the cache.
    pub fn record_hit() {
        counter!("order_cache_hits_total").increment(1);
    }

    /// Record a read that went to the store.
    pub fn record_miss() {
        counter!("order_cache_misses_total").increment(1);
    }
}
