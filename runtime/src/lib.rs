//! # Order Info Runtime
//!
//! The moving parts of the order info service, built only on the capability
//! traits from `order-info-core`:
//!
//! - **[`LocalCache`]**: in-process order cache with keyset-paginated items
//! - **[`OrderController`]**: cache-aside read path
//! - **[`IngestionPipeline`]**: message log consumer with dedup, validation
//!   and retries
//! - **[`PersistAndCache`]**: the pipeline's write handler
//!
//! ## Example
//!
//! ```
//! use order_info_runtime::{LocalCache, OrderController, OrderQueries};
//! use order_info_testing::{InMemoryOrderRepository, sample_order};
//! use order_info_core::OrderRepository;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repo = Arc::new(InMemoryOrderRepository::new());
//! repo.upsert_order(&sample_order("abc123", 2)).await.unwrap();
//!
//! let controller = OrderController::new(repo.clone(), Arc::new(LocalCache::new()));
//! controller.get_order_by_uid("abc123").await.unwrap();
//! controller.get_order_by_uid("abc123").await.unwrap();
//!
//! assert_eq!(repo.get_order_calls(), 1);
//! # }
//! ```

/// Local order cache and startup warm-up
pub mod cache;

/// Cache-aside query orchestration
pub mod controller;

/// Processed-message keys
pub mod dedup;

/// Pipeline write handler
pub mod handler;

/// Prometheus metrics for observability
pub mod metrics;

/// Message consumption, validation and retries
pub mod pipeline;

/// Retry backoff schedule
pub mod retry;

pub use cache::{LocalCache, warm_up_cache};
pub use controller::{OrderController, OrderQueries};
pub use dedup::ProcessedKeys;
pub use handler::PersistAndCache;
pub use pipeline::{IngestionPipeline, Outcome, PipelineConfig};
pub use retry::RetryPolicy;
