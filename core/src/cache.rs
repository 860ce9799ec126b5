//! Local cache abstraction.
//!
//! The cache maps order identifiers to fully materialized orders (items
//! included). It is filled at startup, on every pipeline write and on every
//! read miss; nothing is evicted individually.
//!
//! Operations are synchronous: implementations are in-memory and only block
//! on their own lock.

use crate::error::Result;
use crate::model::{Item, Order};

/// Insert-or-replace order cache with keyset-paginated item reads.
pub trait OrderCache: Send + Sync {
    /// Copy of the cached order with its items cleared.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the order is not cached
    fn get_order_by_uid(&self, order_uid: &str) -> Result<Order>;

    /// Up to `limit` cached items with id greater than `last_id`.
    ///
    /// An empty page means "no more items" and is distinct from an uncached
    /// order.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the order is not cached
    fn get_items_by_order_uid(&self, order_uid: &str, last_id: i64, limit: i64)
    -> Result<Vec<Item>>;

    /// Unconditionally overwrite the entry for `order.order_uid`.
    fn set_order(&self, order: Order);

    /// Drop every entry.
    fn clear(&self);
}
