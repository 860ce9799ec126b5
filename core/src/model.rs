//! The order aggregate: [`Order`] plus its [`Delivery`], [`Payment`] and [`Item`]s.
//!
//! These types are the wire format of the message log (JSON, snake_case keys),
//! the row shape of the relational store and the body of read API responses.
//!
//! # Example
//!
//! ```
//! use order_info_core::model::{Currency, Locale, Order};
//!
//! let json = r#"{
//!     "order_uid": "b563feb7b2b84b6test",
//!     "track_number": "WBILMTESTTRACK",
//!     "entry": "WBIL",
//!     "delivery": {
//!         "name": "Test Testov", "phone": "+9720000000", "zip": "2639809",
//!         "city": "Kiryat Mozkin", "address": "Ploshad Mira 15",
//!         "region": "Kraiot", "email": "test@gmail.com"
//!     },
//!     "payment": {
//!         "transaction": "b563feb7b2b84b6test", "request_id": "", "currency": "USD",
//!         "provider": "wbpay", "amount": 1817, "payment_dt": 1637907727,
//!         "bank": "alpha", "delivery_cost": 1500, "goods_total": 317, "custom_fee": 0
//!     },
//!     "items": [{
//!         "chrt_id": 9934930, "track_number": "WBILMTESTTRACK", "price": 453,
//!         "rid": "ab4219087a764ae0btest", "name": "Mascaras", "sale": 30,
//!         "size": "0", "total_price": 317, "nm_id": 2389212,
//!         "brand": "Vivienne Sabo", "status": 202
//!     }],
//!     "locale": "en",
//!     "internal_signature": "",
//!     "customer_id": "test",
//!     "delivery_service": "meest",
//!     "shardkey": "9",
//!     "sm_id": 99,
//!     "date_created": "2021-11-26T06:22:19Z",
//!     "oof_shard": "1"
//! }"#;
//!
//! let order: Order = serde_json::from_str(json).unwrap();
//! assert_eq!(order.locale, Locale::En);
//! assert_eq!(order.payment.currency, Currency::Usd);
//! assert_eq!(order.items[0].id, 0); // not yet assigned by the store
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root entity of the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Globally unique, alphanumeric order identifier.
    pub order_uid: String,
    /// Tracking number.
    pub track_number: String,
    /// Entry channel.
    pub entry: String,
    /// Delivery details (1:1).
    pub delivery: Delivery,
    /// Payment details (1:1).
    pub payment: Payment,
    /// Items in store-id order. Empty on reads that paginate items separately.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Customer locale.
    pub locale: Locale,
    /// Free-text internal signature, may be empty.
    #[serde(default)]
    pub internal_signature: String,
    /// Customer identifier.
    pub customer_id: String,
    /// Delivery service name.
    pub delivery_service: String,
    /// Shard key.
    pub shardkey: String,
    /// Numeric shard id.
    pub sm_id: i64,
    /// Creation timestamp.
    pub date_created: DateTime<Utc>,
    /// Shard override.
    pub oof_shard: String,
}

impl Order {
    /// Copy of this order with the item list cleared.
    ///
    /// Point reads never carry items; callers page through them separately.
    #[must_use]
    pub fn without_items(&self) -> Self {
        Self {
            items: Vec::new(),
            ..self.clone()
        }
    }
}

/// Delivery details, keyed by the owning order's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Recipient name.
    pub name: String,
    /// Phone number in E.164 format.
    pub phone: String,
    /// Numeric postal code.
    pub zip: String,
    /// City.
    pub city: String,
    /// Street address.
    pub address: String,
    /// Region.
    pub region: String,
    /// Contact email.
    pub email: String,
}

/// Payment details. `transaction` equals the owning order's identifier.
///
/// Monetary fields are in the smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Transaction identifier.
    pub transaction: String,
    /// Upstream request id, may be empty.
    #[serde(default)]
    pub request_id: String,
    /// Currency.
    pub currency: Currency,
    /// Payment provider.
    pub provider: String,
    /// Total amount.
    pub amount: i64,
    /// Payment time as a unix timestamp.
    pub payment_dt: i64,
    /// Bank.
    pub bank: String,
    /// Delivery cost.
    pub delivery_cost: i64,
    /// Goods total.
    pub goods_total: i64,
    /// Custom fee.
    pub custom_fee: i64,
}

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Store-assigned id, the pagination cursor. Zero until persisted.
    #[serde(default)]
    pub id: i64,
    /// Catalog id.
    pub chrt_id: i64,
    /// Track number.
    pub track_number: String,
    /// Unit price.
    pub price: i64,
    /// Rid.
    pub rid: String,
    /// Item name.
    pub name: String,
    /// Sale percentage, 0 to 100.
    pub sale: i64,
    /// Size.
    pub size: String,
    /// Total price after sale.
    pub total_price: i64,
    /// Catalog numeric id.
    pub nm_id: i64,
    /// Brand.
    pub brand: String,
    /// Status code.
    pub status: i64,
}

/// Error returned when parsing an enum column that holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Supported customer locales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English
    En,
    /// Russian
    Ru,
}

impl Locale {
    /// Column representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

impl FromStr for Locale {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            other => Err(UnknownVariant {
                kind: "locale",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported payment currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar
    Usd,
    /// Russian ruble
    Rub,
}

impl Currency {
    /// Column representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Rub => "RUB",
        }
    }
}

impl FromStr for Currency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Self::Usd),
            "RUB" => Ok(Self::Rub),
            other => Err(UnknownVariant {
                kind: "currency",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
