//! Write entry point driven by the ingestion pipeline.
//!
//! The pipeline deserializes and validates a message, then hands the order to
//! an [`OrderHandler`]. The handler's error decides what the pipeline does
//! next: [`OrderError::is_temporary`](crate::error::OrderError::is_temporary)
//! errors are retried, anything else drops the message.

use crate::BoxFuture;
use crate::error::Result;
use crate::model::Order;

/// Persists one validated order.
pub trait OrderHandler: Send + Sync {
    /// Handle `order`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; see [`OrderError`](crate::error::OrderError).
    fn handle<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<()>>;
}
