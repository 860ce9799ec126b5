//! The pipeline's write handler.

use order_info_core::model::Order;
use order_info_core::{BoxFuture, OrderCache, OrderHandler, OrderRepository, Result};
use std::sync::Arc;

/// Upsert the order, then cache the stored aggregate.
///
/// The cached copy carries the store-assigned item ids, so later paginated
/// reads hit the cache.
#[derive(Clone)]
pub struct PersistAndCache {
    repo: Arc<dyn OrderRepository>,
    cache: Arc<dyn OrderCache>,
}

impl PersistAndCache {
    /// Create a handler writing to `repo` and `cache`.
    #[must_use]
    pub fn new(repo: Arc<dyn OrderRepository>, cache: Arc<dyn OrderCache>) -> Self {
        Self { repo, cache }
    }
}

impl OrderHandler for PersistAndCache {
    fn handle<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let stored = self.repo.upsert_order(order).await?;
            tracing::debug!(
                order_uid = %stored.order_uid,
                items = stored.items.len(),
                "Caching stored order"
            );
            self.cache.set_order(stored);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use order_info_core::OrderError;
    use order_info_testing::{InMemoryOrderRepository, sample_order};

    #[tokio::test]
    async fn caches_stored_ids() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let cache = Arc::new(LocalCache::new());
        let handler = PersistAndCache::new(repo.clone(), cache.clone());

        handler.handle(&sample_order("abc", 2)).await.unwrap();

        let items = cache.get_items_by_order_uid("abc", 0, 10).unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(repo.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn failed_upsert_leaves_cache_untouched() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.fail_upserts(&OrderError::Storage("deadlock".into()), 1);
        let cache = Arc::new(LocalCache::new());
        let handler = PersistAndCache::new(repo, cache.clone());

        let err = handler.handle(&sample_order("abc", 1)).await.unwrap_err();

        assert!(err.is_temporary());
        assert!(cache.is_empty());
    }
}
