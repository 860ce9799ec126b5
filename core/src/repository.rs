//! Aggregate store abstraction.
//!
//! The repository owns the relational representation of an [`Order`]
//! aggregate: one row each in `orders`, `deliveries` and `payments`, plus N
//! rows in `items`. It is the single source of truth; the cache and the read
//! API sit in front of it.
//!
//! # Write semantics
//!
//! [`OrderRepository::upsert_order`] is the only write. It re-checks existence
//! on every call, so sending the same order twice converges on the same field
//! values. Item ids are *not* stable across calls: an update deletes every
//! item of the order and inserts them again with fresh ids.
//!
//! # Implementations
//!
//! - `PostgresOrderRepository` (in `order-info-postgres`): production
//! - `InMemoryOrderRepository` (in `order-info-testing`): deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures so the orchestrator and the pipeline can hold
//! an `Arc<dyn OrderRepository>`.

use crate::BoxFuture;
use crate::error::Result;
use crate::model::{Item, Order};

/// Transactional create-or-update and paginated reads of order aggregates.
pub trait OrderRepository: Send + Sync {
    /// Insert the aggregate, or fully replace it if the order already exists.
    ///
    /// Runs in one transaction. Returns the stored aggregate with every item's
    /// freshly assigned store id.
    ///
    /// # Errors
    ///
    /// - `Storage`: any statement, commit or rollback failed. Nothing was written.
    fn upsert_order<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<Order>>;

    /// Fetch order, delivery and payment. Items are left empty.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no order with this identifier
    /// - `Storage`: the read failed
    fn get_order_by_uid<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Order>>;

    /// Fetch up to `limit` orders ordered by identifier, each with delivery,
    /// payment and up to `limit` items. Used to warm the cache at startup.
    ///
    /// # Errors
    ///
    /// - `Storage`: the read failed
    fn get_all_orders(&self, limit: i64) -> BoxFuture<'_, Result<Vec<Order>>>;

    /// Up to `limit` items of the order with store id strictly greater than
    /// `last_id`, ascending. `last_id == 0` starts from the beginning.
    ///
    /// An unknown order yields an empty page.
    ///
    /// # Errors
    ///
    /// - `Storage`: the read failed
    fn get_items_by_order_uid<'a>(
        &'a self,
        order_uid: &'a str,
        last_id: i64,
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Item>>>;
}
