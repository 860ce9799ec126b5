//! `PostgreSQL` implementation of [`OrderRepository`].

use crate::rows::{DeliveryRow, ItemRow, OrderRow, PaymentRow};
use order_info_core::model::{Item, Order};
use order_info_core::{BoxFuture, OrderError, OrderRepository, Result};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use std::time::{Duration, Instant};

const SELECT_ORDER: &str = r"
    SELECT order_uid, track_number, entry, locale, internal_signature,
           customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders
    WHERE order_uid = $1";

const SELECT_ALL_ORDERS: &str = r"
    SELECT order_uid, track_number, entry, locale, internal_signature,
           customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders
    ORDER BY order_uid
    LIMIT $1";

const SELECT_DELIVERY: &str = r"
    SELECT name, phone, zip, city, address, region, email
    FROM deliveries
    WHERE order_uid = $1";

const SELECT_PAYMENT: &str = r"
    SELECT transaction, request_id, currency, provider, amount,
           payment_dt, bank, delivery_cost, goods_total, custom_fee
    FROM payments
    WHERE transaction = $1";

const SELECT_ITEMS_AFTER: &str = r"
    SELECT id, chrt_id, track_number, price, rid, name, sale, size,
           total_price, nm_id, brand, status
    FROM items
    WHERE order_uid = $1 AND id > $2
    ORDER BY id
    LIMIT $3";

const INSERT_ORDER: &str = r"
    INSERT INTO orders
        (order_uid, track_number, entry, locale, internal_signature,
         customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const INSERT_DELIVERY: &str = r"
    INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_PAYMENT: &str = r"
    INSERT INTO payments
        (transaction, request_id, currency, provider, amount,
         payment_dt, bank, delivery_cost, goods_total, custom_fee)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

const INSERT_ITEM: &str = r"
    INSERT INTO items
        (order_uid, chrt_id, track_number, price, rid,
         name, sale, size, total_price, nm_id, brand, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING id";

const UPDATE_ORDER: &str = r"
    UPDATE orders
    SET track_number = $1, entry = $2, locale = $3, internal_signature = $4,
        customer_id = $5, delivery_service = $6, shardkey = $7, sm_id = $8,
        date_created = $9, oof_shard = $10
    WHERE order_uid = $11";

const UPDATE_DELIVERY: &str = r"
    UPDATE deliveries
    SET name = $1, phone = $2, zip = $3, city = $4, address = $5, region = $6, email = $7
    WHERE order_uid = $8";

const UPDATE_PAYMENT: &str = r"
    UPDATE payments
    SET request_id = $1, currency = $2, provider = $3, amount = $4,
        payment_dt = $5, bank = $6, delivery_cost = $7, goods_total = $8, custom_fee = $9
    WHERE transaction = $10";

const DELETE_ITEMS: &str = "DELETE FROM items WHERE order_uid = $1";

const LOCK_ORDER: &str = "SELECT order_uid FROM orders WHERE order_uid = $1 FOR UPDATE";

/// `PostgreSQL`-backed aggregate store.
///
/// Every public operation runs in its own transaction: reads in a read-only
/// one, [`upsert_order`](OrderRepository::upsert_order) in a read-write one
/// that locks the order row before deciding between insert and replace.
///
/// # Example
///
/// ```no_run
/// use order_info_postgres::PostgresOrderRepository;
/// use order_info_core::OrderRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repo = PostgresOrderRepository::new("postgres://localhost/orders").await?;
/// let items = repo.get_items_by_order_uid("b563feb7b2b84b6test", 0, 10).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Storage`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 10, Duration::from_secs(30)).await
    }

    /// Connect with an explicit pool size and acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Storage`] if the connection cannot be established.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| OrderError::Storage(format!("failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to order database");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, read_only: bool) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrderError::Storage(format!("failed to begin transaction: {e}")))?;

        if read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| OrderError::Storage(format!("failed to begin transaction: {e}")))?;
        }

        Ok(tx)
    }

    async fn upsert(&self, order: &Order) -> Result<Order> {
        let started = Instant::now();
        let mut tx = self.begin(false).await?;

        let result = write_aggregate(&mut tx, order).await;
        let (stored, replaced) = finish_transaction(tx, result).await?;

        let kind = if replaced { "replace" } else { "insert" };
        metrics::counter!("order_store_upserts_total", "kind" => kind).increment(1);
        metrics::histogram!("order_store_upsert_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        tracing::debug!(
            order_uid = %stored.order_uid,
            items = stored.items.len(),
            kind,
            "Order aggregate persisted"
        );

        Ok(stored)
    }

    async fn order_by_uid(&self, order_uid: &str) -> Result<Order> {
        let mut tx = self.begin(true).await?;
        let result = load_order(&mut tx, order_uid, None).await;
        finish_transaction(tx, result).await
    }

    async fn all_orders(&self, limit: i64) -> Result<Vec<Order>> {
        let mut tx = self.begin(true).await?;
        let result = load_all_orders(&mut tx, limit).await;
        finish_transaction(tx, result).await
    }

    async fn items_by_order_uid(
        &self,
        order_uid: &str,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<Item>> {
        let mut tx = self.begin(true).await?;
        let result = load_items(&mut tx, order_uid, last_id, limit)
            .await
            .map(|rows| rows.into_iter().map(Item::from).collect());
        finish_transaction(tx, result).await
    }
}

impl OrderRepository for PostgresOrderRepository {
    fn upsert_order<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<Order>> {
        Box::pin(self.upsert(order))
    }

    fn get_order_by_uid<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Order>> {
        Box::pin(self.order_by_uid(order_uid))
    }

    fn get_all_orders(&self, limit: i64) -> BoxFuture<'_, Result<Vec<Order>>> {
        Box::pin(self.all_orders(limit))
    }

    fn get_items_by_order_uid<'a>(
        &'a self,
        order_uid: &'a str,
        last_id: i64,
        limit: i64,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(self.items_by_order_uid(order_uid, last_id, limit))
    }
}

/// Commit on success, roll back on failure.
///
/// A failed rollback is reported as storage error naming both failures.
async fn finish_transaction<T>(tx: Transaction<'_, Postgres>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| OrderError::Storage(format!("commit failed: {e}")))?;
            Ok(value)
        }
        Err(err) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                tracing::error!(error = %err, rollback_error = %rollback_err, "Rollback failed");
                Err(OrderError::Storage(format!(
                    "{err}; rollback failed: {rollback_err}"
                )))
            }
        },
    }
}

/// Classify a driver error: "no rows" is `NotFound`, everything else `Storage`.
fn db_error(context: &str, order_uid: &str, err: sqlx::Error) -> OrderError {
    match err {
        sqlx::Error::RowNotFound => OrderError::NotFound(format!("{context} {order_uid}")),
        other => OrderError::Storage(format!("{context} {order_uid}: {other}")),
    }
}

/// Insert the aggregate or replace it. Returns the stored order and whether
/// it replaced an existing one.
async fn write_aggregate(conn: &mut PgConnection, order: &Order) -> Result<(Order, bool)> {
    let uid = order.order_uid.as_str();

    let existing: Option<(String,)> = sqlx::query_as(LOCK_ORDER)
        .bind(uid)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("failed to check existence of order", uid, e))?;

    let replaced = existing.is_some();
    if replaced {
        replace_rows(conn, order).await?;
    } else {
        insert_rows(conn, order).await?;
    }

    let mut stored = order.clone();
    stored.payment.transaction = order.order_uid.clone();
    for item in &mut stored.items {
        item.id = insert_item(conn, uid, item).await?;
    }

    Ok((stored, replaced))
}

async fn insert_rows(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let uid = order.order_uid.as_str();

    sqlx::query(INSERT_ORDER)
        .bind(uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(order.locale.as_str())
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to insert order", uid, e))?;

    let d = &order.delivery;
    sqlx::query(INSERT_DELIVERY)
        .bind(uid)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to insert delivery of order", uid, e))?;

    let p = &order.payment;
    sqlx::query(INSERT_PAYMENT)
        .bind(uid)
        .bind(&p.request_id)
        .bind(p.currency.as_str())
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to insert payment of order", uid, e))?;

    Ok(())
}

async fn replace_rows(conn: &mut PgConnection, order: &Order) -> Result<()> {
    let uid = order.order_uid.as_str();

    sqlx::query(DELETE_ITEMS)
        .bind(uid)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to delete items of order", uid, e))?;

    sqlx::query(UPDATE_ORDER)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(order.locale.as_str())
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .bind(uid)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to update order", uid, e))?;

    let d = &order.delivery;
    let updated = sqlx::query(UPDATE_DELIVERY)
        .bind(&d.name)
        .bind(&d.phone)
        .bind(&d.zip)
        .bind(&d.city)
        .bind(&d.address)
        .bind(&d.region)
        .bind(&d.email)
        .bind(uid)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to update delivery of order", uid, e))?;
    if updated.rows_affected() != 1 {
        return Err(OrderError::Storage(format!("order {uid} has no delivery row")));
    }

    let p = &order.payment;
    let updated = sqlx::query(UPDATE_PAYMENT)
        .bind(&p.request_id)
        .bind(p.currency.as_str())
        .bind(&p.provider)
        .bind(p.amount)
        .bind(p.payment_dt)
        .bind(&p.bank)
        .bind(p.delivery_cost)
        .bind(p.goods_total)
        .bind(p.custom_fee)
        .bind(uid)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("failed to update payment of order", uid, e))?;
    if updated.rows_affected() != 1 {
        return Err(OrderError::Storage(format!("order {uid} has no payment row")));
    }

    Ok(())
}

async fn insert_item(conn: &mut PgConnection, order_uid: &str, item: &Item) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(INSERT_ITEM)
        .bind(order_uid)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("failed to insert item of order", order_uid, e))?;

    Ok(id)
}

/// Load order, delivery and payment; items only when `item_limit` is set.
async fn load_order(
    conn: &mut PgConnection,
    order_uid: &str,
    item_limit: Option<i64>,
) -> Result<Order> {
    let order: OrderRow = sqlx::query_as(SELECT_ORDER)
        .bind(order_uid)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("failed to get order", order_uid, e))?;

    hydrate(conn, order, item_limit).await
}

async fn hydrate(conn: &mut PgConnection, order: OrderRow, item_limit: Option<i64>) -> Result<Order> {
    let uid = order.order_uid.clone();

    let delivery: DeliveryRow = sqlx::query_as(SELECT_DELIVERY)
        .bind(&uid)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("failed to get delivery of order", &uid, e))?;

    let payment: PaymentRow = sqlx::query_as(SELECT_PAYMENT)
        .bind(&uid)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("failed to get payment of order", &uid, e))?;

    let items = match item_limit {
        Some(limit) => load_items(conn, &uid, 0, limit).await?,
        None => Vec::new(),
    };

    order.into_order(delivery, payment, items)
}

async fn load_all_orders(conn: &mut PgConnection, limit: i64) -> Result<Vec<Order>> {
    let rows: Vec<OrderRow> = sqlx::query_as(SELECT_ALL_ORDERS)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OrderError::Storage(format!("failed to get all orders: {e}")))?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(hydrate(conn, row, Some(limit)).await?);
    }
    Ok(orders)
}

async fn load_items(
    conn: &mut PgConnection,
    order_uid: &str,
    last_id: i64,
    limit: i64,
) -> Result<Vec<ItemRow>> {
    sqlx::query_as(SELECT_ITEMS_AFTER)
        .bind(order_uid)
        .bind(last_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_error("failed to get items of order", order_uid, e))
}
