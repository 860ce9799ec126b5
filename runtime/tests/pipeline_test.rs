//! Integration tests for the ingestion pipeline against in-memory doubles.
//!
//! Backoff tests run on paused tokio time, so the 2s/4s/8s schedule
//! completes instantly.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use order_info_core::model::Order;
use order_info_core::{BoxFuture, MessageLogError, OrderCache, OrderError, OrderHandler};
use order_info_runtime::{
    IngestionPipeline, LocalCache, Outcome, PersistAndCache, PipelineConfig, RetryPolicy,
};
use order_info_testing::fixtures::raw_message;
use order_info_testing::helpers::init_tracing;
use order_info_testing::{
    InMemoryMessageLog, InMemoryOrderRepository, MockClock, order_message, sample_order,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handler that replays a script of errors, then succeeds.
#[derive(Default)]
struct ScriptedHandler {
    errors: Mutex<VecDeque<OrderError>>,
    calls: Mutex<Vec<Instant>>,
    stall: Option<Duration>,
}

impl ScriptedHandler {
    fn failing(error: &OrderError, times: usize) -> Self {
        Self {
            errors: Mutex::new(std::iter::repeat_n(error.clone(), times).collect()),
            ..Self::default()
        }
    }

    fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::default()
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

impl OrderHandler for ScriptedHandler {
    fn handle<'a>(&'a self, _order: &'a Order) -> BoxFuture<'a, order_info_core::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Instant::now());
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            let next = self.errors.lock().unwrap().pop_front();
            next.map_or(Ok(()), Err)
        })
    }
}

struct Harness {
    log: Arc<InMemoryMessageLog>,
    repo: Arc<InMemoryOrderRepository>,
    cache: Arc<LocalCache>,
    pipeline: Arc<IngestionPipeline>,
}

fn config() -> PipelineConfig {
    PipelineConfig {
        poll_timeout: Duration::from_millis(10),
        ..PipelineConfig::default()
    }
}

fn harness(config: PipelineConfig) -> Harness {
    init_tracing();
    let log = Arc::new(InMemoryMessageLog::new());
    let repo = Arc::new(InMemoryOrderRepository::new());
    let cache = Arc::new(LocalCache::new());
    let handler = Arc::new(PersistAndCache::new(repo.clone(), cache.clone()));
    let pipeline = Arc::new(IngestionPipeline::new(log.clone(), handler, config));
    Harness {
        log,
        repo,
        cache,
        pipeline,
    }
}

fn pipeline_with(
    handler: Arc<ScriptedHandler>,
    config: PipelineConfig,
) -> (Arc<InMemoryMessageLog>, IngestionPipeline) {
    init_tracing();
    let log = Arc::new(InMemoryMessageLog::new());
    let pipeline = IngestionPipeline::new(log.clone(), handler, config);
    (log, pipeline)
}

#[tokio::test]
async fn valid_message_is_stored_cached_and_committed() {
    let h = harness(config());
    let message = order_message(&sample_order("abc", 2), 0, 5);

    let outcome = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(outcome, Outcome::Processed);
    assert_eq!(h.repo.upsert_calls(), 1);
    assert_eq!(h.cache.get_items_by_order_uid("abc", 0, 10).unwrap().len(), 2);
    assert_eq!(h.log.committed_offsets(), vec![5]);
    assert!(h.pipeline.processed().contains(&message.processed_key()));
}

#[tokio::test]
async fn message_without_items_is_committed_and_never_handled() {
    let h = harness(config());
    let message = order_message(&sample_order("abc", 0), 0, 1);

    let outcome = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(outcome, Outcome::Invalid);
    assert_eq!(h.repo.upsert_calls(), 0);
    assert!(h.repo.is_empty());
    assert_eq!(h.log.committed_offsets(), vec![1]);
}

#[tokio::test]
async fn malformed_json_is_committed_and_dropped() {
    let h = harness(config());
    let message = raw_message("abc", b"{not json".to_vec(), 0, 2);

    let outcome = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(outcome, Outcome::Malformed);
    assert_eq!(h.repo.upsert_calls(), 0);
    assert_eq!(h.log.committed_offsets(), vec![2]);
}

#[tokio::test]
async fn unknown_currency_is_malformed() {
    let h = harness(config());
    let json = serde_json::to_string(&sample_order("abc", 1))
        .unwrap()
        .replace("\"USD\"", "\"EUR\"");
    let message = raw_message("abc", json.into_bytes(), 0, 3);

    let outcome = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(outcome, Outcome::Malformed);
}

#[tokio::test]
async fn redelivered_message_is_handled_once() {
    let h = harness(config());
    let message = order_message(&sample_order("abc", 1), 2, 10);

    let first = h.pipeline.process_message(&message).await.unwrap();
    let second = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(first, Outcome::Processed);
    assert_eq!(second, Outcome::Duplicate);
    assert_eq!(h.repo.upsert_calls(), 1);
    assert_eq!(h.log.committed_offsets(), vec![10, 10]);
}

#[tokio::test]
async fn same_key_at_another_offset_is_not_a_duplicate() {
    let h = harness(config());
    let order = sample_order("abc", 1);

    h.pipeline.process_message(&order_message(&order, 0, 1)).await.unwrap();
    h.pipeline.process_message(&order_message(&order, 0, 2)).await.unwrap();

    assert_eq!(h.repo.upsert_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn storage_errors_are_retried_with_growing_backoff_then_committed() {
    let handler = Arc::new(ScriptedHandler::failing(&OrderError::Storage("deadlock".into()), 10));
    let (log, pipeline) = pipeline_with(handler.clone(), config());
    let message = order_message(&sample_order("abc", 1), 0, 7);

    let started = Instant::now();
    let err = pipeline.process_message(&message).await.unwrap_err();

    assert!(err.is_temporary());
    let calls = handler.call_times();
    assert_eq!(calls.len(), 4, "first attempt plus three retries");

    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([2, 4, 8]) {
        let expected = Duration::from_secs(expected);
        assert!(*gap >= expected && *gap < expected + Duration::from_millis(50), "{gaps:?}");
    }
    assert!(gaps.windows(2).all(|w| w[0] < w[1]), "backoff grows: {gaps:?}");
    assert!(started.elapsed() >= Duration::from_secs(14));

    assert_eq!(log.committed_offsets(), vec![7]);
    assert!(pipeline.processed().contains(&message.processed_key()));
}

#[tokio::test(start_paused = true)]
async fn transient_failure_then_success_is_processed() {
    let h = harness(config());
    h.repo.fail_upserts(&OrderError::Storage("connection reset".into()), 2);
    let message = order_message(&sample_order("abc", 1), 0, 3);

    let outcome = h.pipeline.process_message(&message).await.unwrap();

    assert_eq!(outcome, Outcome::Processed);
    assert_eq!(h.repo.upsert_calls(), 3);
    assert_eq!(h.log.committed_offsets(), vec![3]);
    assert!(h.cache.get_order_by_uid("abc").is_ok());
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let handler = Arc::new(ScriptedHandler::failing(&OrderError::InvalidInput("bad".into()), 10));
    let (log, pipeline) = pipeline_with(handler.clone(), config());
    let message = order_message(&sample_order("abc", 1), 0, 4);

    let started = Instant::now();
    let err = pipeline.process_message(&message).await.unwrap_err();

    assert_eq!(err, OrderError::InvalidInput("bad".into()));
    assert_eq!(handler.call_times().len(), 1);
    assert!(started.elapsed() < Duration::from_secs(1), "no backoff sleep");
    assert_eq!(log.committed_offsets(), vec![4]);
    assert!(pipeline.processed().contains(&message.processed_key()));
}

#[tokio::test(start_paused = true)]
async fn stalled_handler_times_out_as_temporary() {
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_secs(120)));
    let mut config = config();
    config.retry_policy = RetryPolicy::builder().max_retries(0).build();
    let (log, pipeline) = pipeline_with(handler, config);
    let message = order_message(&sample_order("abc", 1), 0, 8);

    let started = Instant::now();
    let err = pipeline.process_message(&message).await.unwrap_err();

    assert!(err.is_temporary());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    assert_eq!(log.committed_offsets(), vec![8]);
}

#[tokio::test]
async fn failed_commit_after_success_is_reported_and_not_marked() {
    let h = harness(config());
    h.log.fail_commits(true);
    let message = order_message(&sample_order("abc", 1), 0, 6);

    let err = h.pipeline.process_message(&message).await.unwrap_err();

    assert!(matches!(err, OrderError::Messaging(_)));
    assert!(!h.pipeline.processed().contains(&message.processed_key()));
}

#[tokio::test]
async fn run_drains_messages_and_survives_poll_errors() {
    let h = harness(config());
    let order = sample_order("abc", 2);
    h.log.push_message(order_message(&order, 0, 0));
    h.log.push_error(MessageLogError::Poll("broker transport failure".into()));
    h.log.push_message(order_message(&sample_order("def", 0), 0, 1));
    h.log.push_message(order_message(&order, 0, 0));
    h.log.push_message(order_message(&sample_order("ghi", 1), 0, 2));

    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    tokio::time::timeout(Duration::from_secs(5), h.log.wait_for_commits(4))
        .await
        .expect("pipeline committed every message");
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.log.committed_offsets(), vec![0, 1, 0, 2]);
    assert_eq!(h.repo.upsert_calls(), 2);
    assert_eq!(h.repo.len(), 2);

    h.pipeline.close().unwrap();
    assert!(h.log.is_closed());
    assert!(h.pipeline.processed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_run_interrupts_a_stalled_attempt() {
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_secs(600)));
    let mut config = config();
    config.retry_policy = RetryPolicy::builder().max_retries(0).build();
    let (log, pipeline) = pipeline_with(handler.clone(), config);
    let message = order_message(&sample_order("abc", 1), 0, 3);
    log.push_message(message.clone());
    let pipeline = Arc::new(pipeline);

    let started = Instant::now();
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handler.call_times().len(), 1);
    cancel.cancel();
    task.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(log.committed_offsets().is_empty());
    assert!(!pipeline.processed().contains(&message.processed_key()));
}

#[tokio::test(start_paused = true)]
async fn cancelling_run_during_backoff_stops_retrying() {
    let handler = Arc::new(ScriptedHandler::failing(
        &OrderError::Storage("connection reset".into()),
        4,
    ));
    let (log, pipeline) = pipeline_with(handler.clone(), config());
    log.push_message(order_message(&sample_order("abc", 1), 0, 4));
    let pipeline = Arc::new(pipeline);

    let started = Instant::now();
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });

    // attempts at 0s and 2s; the next one would start at 6s
    tokio::time::sleep(Duration::from_secs(3)).await;
    cancel.cancel();
    task.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(handler.call_times().len(), 2);
    assert!(log.committed_offsets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_interrupts_a_message_in_flight() {
    let handler = Arc::new(ScriptedHandler::stalling(Duration::from_secs(600)));
    let (log, pipeline) = pipeline_with(handler, config());
    let pipeline = Arc::new(pipeline);
    let message = order_message(&sample_order("abc", 1), 0, 5);

    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.process_message(&message).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    pipeline.close().unwrap();

    assert_eq!(task.await.unwrap().unwrap(), Outcome::Cancelled);
    assert!(log.committed_offsets().is_empty());
}

#[tokio::test]
async fn cancelled_pipeline_stops_polling() {
    let h = harness(config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    h.pipeline.run(cancel).await;

    assert_eq!(h.log.polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cleanup_task_purges_old_keys() {
    let clock = Arc::new(MockClock::default());
    let log = Arc::new(InMemoryMessageLog::new());
    let repo = Arc::new(InMemoryOrderRepository::new());
    let handler = Arc::new(PersistAndCache::new(repo, Arc::new(LocalCache::new())));
    let config = PipelineConfig {
        cleanup_interval: Duration::from_secs(1),
        max_age: Duration::from_secs(60),
        ..config()
    };
    let pipeline = Arc::new(IngestionPipeline::with_clock(log, handler, config, clock.clone()));

    pipeline
        .process_message(&order_message(&sample_order("abc", 1), 0, 1))
        .await
        .unwrap();
    assert_eq!(pipeline.processed().len(), 1);
    clock.advance(chrono::Duration::minutes(2));

    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        async move { pipeline.run(cancel).await }
    });
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(pipeline.processed().is_empty());

    cancel.cancel();
    task.await.unwrap();
    pipeline.close().unwrap();
}
