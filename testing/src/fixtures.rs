//! Valid sample data.

use chrono::DateTime;
use order_info_core::message_log::LogMessage;
use order_info_core::model::{Currency, Delivery, Item, Locale, Order, Payment};

/// Topic used by fixture messages.
pub const TEST_TOPIC: &str = "orders";

/// An order with `item_count` items that passes validation.
///
/// Item ids are zero, as in an incoming message.
#[must_use]
pub fn sample_order(order_uid: &str, item_count: usize) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: Currency::Usd,
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1_637_907_727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            custom_fee: 0,
        },
        items: (0..item_count).map(sample_item).collect(),
        locale: Locale::En,
        internal_signature: String::new(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: DateTime::from_timestamp(1_637_907_739, 0).unwrap_or_default(),
        oof_shard: "1".to_string(),
    }
}

/// The `n`th item of [`sample_order`], with id zero.
#[must_use]
pub fn sample_item(n: usize) -> Item {
    let n = i64::try_from(n).unwrap_or_default();
    Item {
        id: 0,
        chrt_id: 9_934_930 + n,
        track_number: "WBILMTESTTRACK".to_string(),
        price: 453,
        rid: format!("ab4219087a764ae0btest{n}"),
        name: "Mascaras".to_string(),
        sale: 30,
        size: "0".to_string(),
        total_price: 317,
        nm_id: 2_389_212 + n,
        brand: "Vivienne Sabo".to_string(),
        status: 202,
    }
}

/// A log message carrying `order` as JSON, keyed by its identifier.
#[must_use]
pub fn order_message(order: &Order, partition: i32, offset: i64) -> LogMessage {
    raw_message(
        &order.order_uid,
        serde_json::to_vec(order).unwrap_or_default(),
        partition,
        offset,
    )
}

/// A log message with an arbitrary payload.
#[must_use]
pub fn raw_message(key: &str, payload: Vec<u8>, partition: i32, offset: i64) -> LogMessage {
    LogMessage {
        topic: TEST_TOPIC.to_string(),
        key: Some(key.as_bytes().to_vec()),
        payload: Some(payload),
        partition,
        offset,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use order_info_core::validate_order;

    #[test]
    fn sample_order_is_valid() {
        validate_order(&sample_order("b563feb7b2b84b6test", 3)).unwrap();
    }

    #[test]
    fn order_message_round_trips_payload() {
        let order = sample_order("abc", 1);
        let message = order_message(&order, 0, 7);
        let decoded: Order = serde_json::from_slice(message.payload.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(message.processed_key(), "abc_0_7");
    }
}
