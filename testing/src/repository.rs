//! In-memory [`OrderRepository`].

use order_info_core::model::{Item, Order};
use order_info_core::{BoxFuture, OrderError, OrderRepository, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<String, Order>,
    next_item_id: i64,
    upsert_failures: VecDeque<OrderError>,
    read_failure: Option<OrderError>,
}

/// Deterministic aggregate store.
///
/// Mirrors the relational store's observable behavior: item ids come from a
/// single sequence shared by all orders, an upsert of a known order replaces
/// every item with freshly numbered ones, and point reads leave items empty.
///
/// Every trait method bumps a call counter, and failures can be queued for
/// upserts or set for all reads.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    state: Mutex<State>,
    upsert_calls: AtomicUsize,
    get_order_calls: AtomicUsize,
    get_all_calls: AtomicUsize,
    get_items_calls: AtomicUsize,
}

impl InMemoryOrderRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` upserts with `error`, before touching any data.
    pub fn fail_upserts(&self, error: &OrderError, times: usize) {
        let mut state = self.state();
        state
            .upsert_failures
            .extend(std::iter::repeat_n(error.clone(), times));
    }

    /// Fail every read with `error` until [`clear_read_failure`](Self::clear_read_failure).
    pub fn fail_reads(&self, error: OrderError) {
        self.state().read_failure = Some(error);
    }

    /// Let reads succeed again.
    pub fn clear_read_failure(&self) {
        self.state().read_failure = None;
    }

    /// The stored aggregate with all items, bypassing counters and failures.
    #[must_use]
    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.state().orders.get(order_uid).cloned()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().orders.len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls to `upsert_order`.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Calls to `get_order_by_uid`.
    #[must_use]
    pub fn get_order_calls(&self) -> usize {
        self.get_order_calls.load(Ordering::SeqCst)
    }

    /// Calls to `get_all_orders`.
    #[must_use]
    pub fn get_all_calls(&self) -> usize {
        self.get_all_calls.load(Ordering::SeqCst)
    }

    /// Calls to `get_items_by_order_uid`.
    #[must_use]
    pub fn get_items_calls(&self) -> usize {
        self.get_items_calls.load(Ordering::SeqCst)
    }

    fn upsert(&self, order: &Order) -> Result<Order> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if let Some(err) = state.upsert_failures.pop_front() {
            return Err(err);
        }

        let mut stored = order.clone();
        stored.payment.transaction = order.order_uid.clone();
        for item in &mut stored.items {
            state.next_item_id += 1;
            item.id = state.next_item_id;
        }
        state.orders.insert(stored.order_uid.clone(), stored.clone());
        Ok(stored)
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> Result<T>) -> Result<T> {
        let state = self.state();
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => f(&state),
        }
    }
}

fn page(items: &[Item], last_id: i64, limit: i64) -> Vec<Item> {
    let limit = usize::try_from(limit).unwrap_or(0);
    items
        .iter()
        .filter(|item| item.id > last_id)
        .take(limit)
        .cloned()
        .collect()
}

impl OrderRepository for InMemoryOrderRepository {
    fn upsert_order<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<Order>> {
        Box::pin(async move { self.upsert(order) })
    }

    fn get_order_by_uid<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Order>> {
        Box::pin(async move {
            self.get_order_calls.fetch_add(1, Ordering::SeqCst);
            self.read(|state| {
                state
                    .orders
                    .get(order_uid)
                    .map(Order::without_items)
                    .ok_or_else(|| OrderError::NotFound(format!("order {order_uid}")))
            })
        })
    }

    fn get_all_orders(&self, limit: i64) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(async move {
            self.get_all_calls.fetch_add(1, Ordering::SeqCst);
            self.read(|state| {
                let count = usize::try_from(limit).unwrap_or(0);
                Ok(state
                    .orders
                    .values()
                    .take(count)
                    .map(|order| Order {
                        items: page(&order.items, 0, limit),
                        ..order.clone()
                    })
                    .collect())
            })
        })
    }

    fn get_items_by_order_uid<'a>(
        &'a self,
        order_uid: &'a str,
        last_id: i64,
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(async move {
            self.get_items_calls.fetch_add(1, Ordering::SeqCst);
            self.read(|state| {
                Ok(state
                    .orders
                    .get(order_uid)
                    .map(|order| page(&order.items, last_id, limit))
                    .unwrap_or_default())
            })
        })
    }
}
