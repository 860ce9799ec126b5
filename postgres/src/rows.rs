//! Row shapes of the four aggregate tables and their conversion into model types.

use chrono::{DateTime, Utc};
use order_info_core::model::{Delivery, Item, Order, Payment};
use order_info_core::{OrderError, Result};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i64,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeliveryRow {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

impl TryFrom<PaymentRow> for Payment {
    type Error = OrderError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        let currency = row
            .currency
            .parse()
            .map_err(|e| OrderError::Storage(format!("payment {}: {e}", row.transaction)))?;

        Ok(Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        })
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}

impl OrderRow {
    /// Assemble the aggregate from its rows.
    pub(crate) fn into_order(
        self,
        delivery: DeliveryRow,
        payment: PaymentRow,
        items: Vec<ItemRow>,
    ) -> Result<Order> {
        let locale = self
            .locale
            .parse()
            .map_err(|e| OrderError::Storage(format!("order {}: {e}", self.order_uid)))?;

        Ok(Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery: delivery.into(),
            payment: payment.try_into()?,
            items: items.into_iter().map(Item::from).collect(),
            locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        })
    }
}
