//! In-process order cache.

use order_info_core::model::{Item, Order};
use order_info_core::{OrderCache, OrderError, OrderRepository, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Map from order identifier to the fully materialized order.
///
/// One reader/writer lock guards the whole map. Entries are only replaced or
/// dropped all at once by [`clear`](OrderCache::clear).
#[derive(Debug, Default)]
pub struct LocalCache {
    orders: RwLock<HashMap<String, Order>>,
}

impl LocalCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyset page: starting at the first item with id greater than `last_id`,
/// up to `limit` items.
fn page_after(items: &[Item], last_id: i64, limit: i64) -> Vec<Item> {
    let Some(start) = items.iter().position(|item| item.id > last_id) else {
        return Vec::new();
    };
    let limit = usize::try_from(limit).unwrap_or(0);
    items[start..].iter().take(limit).cloned().collect()
}

impl OrderCache for LocalCache {
    fn get_order_by_uid(&self, order_uid: &str) -> Result<Order> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        orders
            .get(order_uid)
            .map(Order::without_items)
            .ok_or_else(|| OrderError::NotFound(format!("order {order_uid} not found in cache")))
    }

    fn get_items_by_order_uid(
        &self,
        order_uid: &str,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<Item>> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get(order_uid).ok_or_else(|| {
            OrderError::NotFound(format!(
                "failed to get items of order {order_uid}: order not found in cache"
            ))
        })?;
        Ok(page_after(&order.items, last_id, limit))
    }

    fn set_order(&self, order: Order) {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.insert(order.order_uid.clone(), order);
    }

    fn clear(&self) {
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Load up to `limit` orders from the store into the cache.
///
/// Returns how many orders were cached.
///
/// # Errors
///
/// Returns the store's error if the orders cannot be read; the cache is left
/// untouched.
pub async fn warm_up_cache(
    repo: &dyn OrderRepository,
    cache: &dyn OrderCache,
    limit: i64,
) -> Result<usize> {
    let orders = repo.get_all_orders(limit).await?;
    let count = orders.len();
    for order in orders {
        cache.set_order(order);
    }
    Ok(count)
}
