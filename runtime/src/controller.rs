//! Cache-aside read path.

use crate::metrics::CacheMetrics;
use order_info_core::model::{Item, Order};
use order_info_core::{BoxFuture, OrderCache, OrderError, OrderRepository, Result};
use std::sync::Arc;

/// Read operations served to API callers.
pub trait OrderQueries: Send + Sync {
    /// The order without items.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order
    /// - `Storage`: the store failed
    fn get_order_by_uid<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Order>>;

    /// One keyset page of the order's items.
    ///
    /// # Errors
    ///
    /// - `Storage`: the store failed
    fn get_items_by_order_uid<'a>(
        &'a self,
        order_uid: &'a str,
        last_id: i64,
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Item>>>;
}

/// Serves reads from the [`OrderCache`], falling back to the
/// [`OrderRepository`] and populating the cache on a miss.
#[derive(Clone)]
pub struct OrderController {
    repo: Arc<dyn OrderRepository>,
    cache: Arc<dyn OrderCache>,
}

impl OrderController {
    /// Create a controller over `repo` and `cache`.
    #[must_use]
    pub fn new(repo: Arc<dyn OrderRepository>, cache: Arc<dyn OrderCache>) -> Self {
        Self { repo, cache }
    }

    async fn order(&self, order_uid: &str) -> Result<Order> {
        tracing::info!(order_uid, "Request to get order by id");

        if let Ok(order) = self.cache.get_order_by_uid(order_uid) {
            CacheMetrics::record_hit();
            return Ok(order);
        }
        CacheMetrics::record_miss();

        let order = self
            .repo
            .get_order_by_uid(order_uid)
            .await
            .inspect_err(|e| log_error("Failed to get order by id", order_uid, e))?;

        self.cache.set_order(order.clone());
        Ok(order)
    }

    async fn items(&self, order_uid: &str, last_id: i64, limit: i64) -> Result<Vec<Item>> {
        tracing::info!(order_uid, last_id, limit, "Request to get items by order id");

        if let Ok(items) = self.cache.get_items_by_order_uid(order_uid, last_id, limit) {
            if !items.is_empty() {
                CacheMetrics::record_hit();
                return Ok(items);
            }
        }
        CacheMetrics::record_miss();

        let items = self
            .repo
            .get_items_by_order_uid(order_uid, last_id, limit)
            .await
            .inspect_err(|e| log_error("Failed to get items", order_uid, e))?;

        match self.order_for_refresh(order_uid).await {
            Ok(mut order) => {
                order.items.clone_from(&items);
                self.cache.set_order(order);
            }
            Err(e) => {
                tracing::warn!(order_uid, error = %e, "Failed to refresh cached items");
            }
        }

        Ok(items)
    }

    /// Order header to rewrite with a fresh page; not a read of its own, so
    /// no metrics and no request log.
    async fn order_for_refresh(&self, order_uid: &str) -> Result<Order> {
        match self.cache.get_order_by_uid(order_uid) {
            Ok(order) => Ok(order),
            Err(_) => self.repo.get_order_by_uid(order_uid).await,
        }
    }
}

fn log_error(msg: &str, order_uid: &str, err: &OrderError) {
    if err.is_not_found() {
        tracing::warn!(order_uid, error = %err, "{msg}");
    } else {
        tracing::error!(order_uid, error = %err, "{msg}");
    }
}

impl OrderQueries for OrderController {
    fn get_order_by_uid<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Order>> {
        Box::pin(self.order(order_uid))
    }

    fn get_items_by_order_uid<'a>(
        &'a self,
        order_uid: &'a str,
        last_id: i64,
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(self.items(order_uid, last_id, limit))
    }
}
