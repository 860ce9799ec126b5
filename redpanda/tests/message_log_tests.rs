//! Integration tests for [`RedpandaMessageLog`] and [`RedpandaOrderPublisher`]
//! against a real Kafka broker.
//!
//! Marked `#[ignore]`: they need Docker and take 15-60 seconds each.
//!
//! ```bash
//! cargo test -p order-info-redpanda --test message_log_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use order_info_core::{MessageLog, Order};
use order_info_redpanda::{RedpandaMessageLog, RedpandaOrderPublisher};
use order_info_testing::sample_order;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

/// Publish until the broker accepts writes, creating the topic on the way.
async fn wait_for_topic(publisher: &RedpandaOrderPublisher, topic: &str) {
    let warmup = sample_order("warmup", 1);
    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if publisher.publish(&warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Topic {topic} not ready after {max_attempts} attempts"
        );
    }
}

/// Poll until an order with `order_uid` arrives, committing everything seen.
async fn receive_order(log: &RedpandaMessageLog, order_uid: &str) -> Order {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        let Some(message) = log
            .poll(Duration::from_millis(500))
            .await
            .expect("poll failed")
        else {
            continue;
        };
        log.commit(&message).await.expect("commit failed");

        let payload = message.payload.as_deref().unwrap_or_default();
        let order: Order = serde_json::from_slice(payload).expect("payload is an order");
        if order.order_uid == order_uid {
            assert_eq!(message.key_str(), order_uid);
            return order;
        }
    }
    panic!("order {order_uid} was not received");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn published_order_is_consumed_and_committed() {
    let (_kafka, brokers) = start_kafka().await;

    let publisher = RedpandaOrderPublisher::new(&brokers, "orders").expect("producer");
    wait_for_topic(&publisher, "orders").await;

    let log = RedpandaMessageLog::builder()
        .brokers(&brokers)
        .group_id("order-info-test")
        .topic("orders")
        .build()
        .expect("consumer");

    let order = sample_order("b563feb7b2b84b6test", 2);
    publisher.publish(&order).await.expect("publish");

    let received = receive_order(&log, &order.order_uid).await;
    assert_eq!(received, order);

    log.close().expect("close");
    assert!(log.poll(Duration::from_millis(10)).await.is_err());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn committed_messages_are_not_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;

    let publisher = RedpandaOrderPublisher::new(&brokers, "orders").expect("producer");
    wait_for_topic(&publisher, "orders").await;

    let first = sample_order("first", 1);
    publisher.publish(&first).await.expect("publish first");

    {
        let log = RedpandaMessageLog::builder()
            .brokers(&brokers)
            .group_id("order-info-redelivery")
            .topic("orders")
            .build()
            .expect("consumer");
        receive_order(&log, "first").await;
        log.close().expect("close");
    }

    let second = sample_order("second", 1);
    publisher.publish(&second).await.expect("publish second");

    let log = RedpandaMessageLog::builder()
        .brokers(&brokers)
        .group_id("order-info-redelivery")
        .topic("orders")
        .build()
        .expect("consumer");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let mut seen = Vec::new();
    while tokio::time::Instant::now() < deadline && !seen.iter().any(|uid| uid == "second") {
        if let Some(message) = log
            .poll(Duration::from_millis(500))
            .await
            .expect("poll failed")
        {
            seen.push(message.key_str().into_owned());
            log.commit(&message).await.expect("commit failed");
        }
    }

    assert!(seen.iter().any(|uid| uid == "second"));
    assert!(!seen.iter().any(|uid| uid == "first"));
}
