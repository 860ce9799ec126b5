//! Scripted in-memory [`MessageLog`].

use order_info_core::BoxFuture;
use order_info_core::message_log::{LogMessage, MessageLog, MessageLogError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Message log that replays a script of poll results.
///
/// Each `poll` pops the next scripted result. An empty script behaves like an
/// idle topic: the poll waits for its timeout and returns `Ok(None)`.
/// Commits are recorded in call order.
#[derive(Debug, Default)]
pub struct InMemoryMessageLog {
    script: Mutex<VecDeque<Result<Option<LogMessage>, MessageLogError>>>,
    commits: Mutex<Vec<LogMessage>>,
    fail_commits: AtomicBool,
    closed: AtomicBool,
    polls: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryMessageLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that will deliver `messages` in order.
    #[must_use]
    pub fn with_messages(messages: impl IntoIterator<Item = LogMessage>) -> Self {
        let log = Self::new();
        for message in messages {
            log.push_message(message);
        }
        log
    }

    /// Append a message to the script.
    pub fn push_message(&self, message: LogMessage) {
        lock(&self.script).push_back(Ok(Some(message)));
    }

    /// Append a poll error to the script.
    pub fn push_error(&self, error: MessageLogError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Reject every commit from now on.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Messages committed so far.
    #[must_use]
    pub fn committed(&self) -> Vec<LogMessage> {
        lock(&self.commits).clone()
    }

    /// Offsets committed so far, in commit order.
    #[must_use]
    pub fn committed_offsets(&self) -> Vec<i64> {
        lock(&self.commits).iter().map(|m| m.offset).collect()
    }

    /// Scripted results not yet polled.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.script).len()
    }

    /// Number of `poll` calls.
    #[must_use]
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` commits were recorded.
    pub async fn wait_for_commits(&self, count: usize) {
        while lock(&self.commits).len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl MessageLog for InMemoryMessageLog {
    fn poll(
        &self,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<Option<LogMessage>, MessageLogError>> {
        Box::pin(async move {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.is_closed() {
                return Err(MessageLogError::Poll("consumer is closed".to_string()));
            }

            let next = lock(&self.script).pop_front();
            match next {
                Some(result) => result,
                None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        })
    }

    fn commit<'a>(&'a self, message: &'a LogMessage) -> BoxFuture<'a, Result<(), MessageLogError>> {
        Box::pin(async move {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(MessageLogError::Commit(format!(
                    "rejected offset {} on partition {}",
                    message.offset, message.partition
                )));
            }
            lock(&self.commits).push(message.clone());
            Ok(())
        })
    }

    fn close(&self) -> Result<(), MessageLogError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
