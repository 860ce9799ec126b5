//! Structural and business validation of incoming orders.
//!
//! A message that deserializes into an [`Order`] can still be unusable: empty
//! required fields, a phone number that is not E.164, a sale outside 0..=100,
//! no items at all. [`validate_order`] collects every violation so the log line
//! for a dropped message names all of them at once.

use crate::model::{Delivery, Item, Order, Payment};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // literal pattern
static ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid regex"));

#[allow(clippy::expect_used)] // literal pattern
static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{1,14}$").expect("valid regex"));

#[allow(clippy::expect_used)] // literal pattern
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));

#[allow(clippy::expect_used)] // literal pattern
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex")
});

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path of the offending field, e.g. `delivery.phone` or `items[2].sale`.
    pub field: String,
    /// Name of the rule that failed.
    pub rule: &'static str,
}

/// All rule violations found in one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// The individual violations, in field order.
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Whether `field` failed any rule.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", v.field, v.rule)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Default)]
struct Violations(Vec<FieldViolation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, rule: &'static str) {
        self.0.push(FieldViolation {
            field: field.into(),
            rule,
        });
    }

    fn required(&mut self, field: impl Into<String>, value: &str) -> bool {
        if value.trim().is_empty() {
            self.push(field, "required");
            return false;
        }
        true
    }

    fn required_matching(&mut self, field: &str, value: &str, pattern: &Regex, rule: &'static str) {
        if self.required(field, value) && !pattern.is_match(value) {
            self.push(field, rule);
        }
    }

    fn nonzero(&mut self, field: impl Into<String>, value: i64) {
        if value == 0 {
            self.push(field, "required");
        }
    }

    fn non_negative(&mut self, field: impl Into<String>, value: i64) {
        if value < 0 {
            self.push(field, "min=0");
        }
    }
}

/// Validate an order before it is handed to the write path.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every violated rule.
pub fn validate_order(order: &Order) -> Result<(), ValidationError> {
    let mut v = Violations::default();

    v.required_matching("order_uid", &order.order_uid, &ALPHANUMERIC, "alphanum");
    v.required("track_number", &order.track_number);
    v.required("entry", &order.entry);
    v.required("customer_id", &order.customer_id);
    v.required("delivery_service", &order.delivery_service);
    v.required("shardkey", &order.shardkey);
    v.nonzero("sm_id", order.sm_id);
    v.required("oof_shard", &order.oof_shard);

    check_delivery(&mut v, &order.delivery);
    check_payment(&mut v, &order.payment, &order.order_uid);

    if order.items.is_empty() {
        v.push("items", "min=1");
    }
    for (i, item) in order.items.iter().enumerate() {
        check_item(&mut v, i, item);
    }

    if v.0.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations: v.0 })
    }
}

fn check_delivery(v: &mut Violations, d: &Delivery) {
    v.required("delivery.name", &d.name);
    v.required_matching("delivery.phone", &d.phone, &E164, "e164");
    v.required_matching("delivery.zip", &d.zip, &NUMERIC, "numeric");
    v.required("delivery.city", &d.city);
    v.required("delivery.address", &d.address);
    v.required("delivery.region", &d.region);
    v.required_matching("delivery.email", &d.email, &EMAIL, "email");
}

fn check_payment(v: &mut Violations, p: &Payment, order_uid: &str) {
    if v.required("payment.transaction", &p.transaction) && p.transaction != order_uid {
        v.push("payment.transaction", "eq=order_uid");
    }
    v.required("payment.provider", &p.provider);
    v.non_negative("payment.amount", p.amount);
    v.nonzero("payment.payment_dt", p.payment_dt);
    v.required("payment.bank", &p.bank);
    v.non_negative("payment.delivery_cost", p.delivery_cost);
    v.non_negative("payment.goods_total", p.goods_total);
    v.non_negative("payment.custom_fee", p.custom_fee);
}

fn check_item(v: &mut Violations, i: usize, item: &Item) {
    let field = |name: &str| format!("items[{i}].{name}");

    v.nonzero(field("chrt_id"), item.chrt_id);
    v.required(field("track_number"), &item.track_number);
    v.non_negative(field("price"), item.price);
    v.required(field("rid"), &item.rid);
    v.required(field("name"), &item.name);
    if !(0..=100).contains(&item.sale) {
        v.push(field("sale"), "range=0..100");
    }
    v.required(field("size"), &item.size);
    v.non_negative(field("total_price"), item.total_price);
    v.nonzero(field("nm_id"), item.nm_id);
    v.required(field("brand"), &item.brand);
    v.nonzero(field("status"), item.status);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Currency, Locale};
    use chrono::{TimeZone, Utc};

    fn valid_order() -> Order {
        Order {
            order_uid: "b563feb7b2b84b6test".to_string(),
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
                transaction: "b563feb7b2b84b6test".to_string(),
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
            items: vec![Item {
                id: 0,
                chrt_id: 9_934_930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2_389_212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            }],
            locale: Locale::En,
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
            oof_shard: "1".to_string(),
        }
    }

    #[test]
    fn accepts_a_complete_order() {
        assert!(validate_order(&valid_order()).is_ok());
    }

    #[test]
    fn rejects_order_without_items() {
        let mut order = valid_order();
        order.items.clear();

        let err = validate_order(&order).unwrap_err();
        assert!(err.has_field("items"));
        assert_eq!(err.to_string(), "validation failed: items: min=1");
    }

    #[test]
    fn collects_every_violation() {
        let mut order = valid_order();
        order.order_uid = "not-alpha-num".to_string();
        order.delivery.phone = "12345".to_string();
        order.delivery.email = "nobody".to_string();
        order.items[0].sale = 140;

        let err = validate_order(&order).unwrap_err();
        assert!(err.has_field("order_uid"));
        assert!(err.has_field("delivery.phone"));
        assert!(err.has_field("delivery.email"));
        assert!(err.has_field("items[0].sale"));
        // transaction no longer matches the (invalid) uid either
        assert!(err.has_field("payment.transaction"));
    }

    #[test]
    fn rejects_negative_money_but_allows_zero_fee() {
        let mut order = valid_order();
        order.payment.custom_fee = 0;
        assert!(validate_order(&order).is_ok());

        order.payment.amount = -1;
        let err = validate_order(&order).unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.violations()[0].rule, "min=0");
    }

    #[test]
    fn zip_must_be_numeric() {
        let mut order = valid_order();
        order.delivery.zip = "26A9".to_string();
        let err = validate_order(&order).unwrap_err();
        assert!(err.has_field("delivery.zip"));
    }
}
