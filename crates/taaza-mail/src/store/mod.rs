//! Durable queue store abstraction.

mod memory;

pub use memory::MemoryQueueStore;

use crate::error::MailResult;
use crate::job::EmailJob;
use crate::metrics::MailMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use taaza_config::EmailConfig;
use tracing::{debug, warn};

/// Storage for email jobs: an immediate FIFO queue, a scheduled set ordered
/// by `not_before`, and a dead-letter list.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Store a job. A job whose `not_before` is in the future goes to the
    /// scheduled set; anything else goes to the tail of the immediate queue.
    ///
    /// An error means the job was not stored.
    async fn enqueue(&self, job: &EmailJob) -> MailResult<()>;

    /// Promote every due scheduled job to the immediate queue in ascending
    /// `not_before` order, then pop the head of the immediate queue, waiting
    /// a bounded interval for one to arrive.
    async fn dequeue_due(&self) -> MailResult<Option<EmailJob>>;

    /// Append a job to the dead-letter list.
    async fn dead_letter(&self, job: &EmailJob) -> MailResult<()>;

    /// Current sizes of the queue, the scheduled set, and the dead-letter list.
    async fn stats(&self) -> MailResult<QueueStats>;

    /// Most recent dead-lettered jobs, newest first.
    async fn dead_letters(&self, limit: usize) -> MailResult<Vec<EmailJob>>;

    /// Check the store is reachable.
    async fn health_check(&self) -> MailResult<()>;

    /// Release connections. Further calls fail.
    async fn close(&self) {}
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs ready to run.
    pub queued: u64,

    /// Jobs waiting for their `not_before`.
    pub scheduled: u64,

    /// Jobs that exhausted their attempts.
    pub dead_letter: u64,
}

/// Bounded retry for writes that put a job back into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRetry {
    /// Tries per write, including the first.
    pub attempts: u32,

    /// Pause between tries.
    pub pause: Duration,
}

impl Default for StoreRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            pause: Duration::from_secs(5),
        }
    }
}

impl From<&EmailConfig> for StoreRetry {
    fn from(config: &EmailConfig) -> Self {
        Self {
            attempts: config.store_write_attempts,
            pause: config.store_error_pause(),
        }
    }
}

impl StoreRetry {
    /// Run `write` until it succeeds or the tries run out. Returns the last
    /// error; the caller still owns the job at that point.
    pub async fn run<F, Fut>(&self, operation: &'static str, mut write: F) -> MailResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MailResult<()>>,
    {
        let attempts = self.attempts.max(1);
        let mut tried = 1;
        loop {
            match write().await {
                Ok(()) => {
                    if tried > 1 {
                        debug!(operation, tried, "Queue store write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    MailMetrics::store_error(operation);
                    if tried >= attempts {
                        return Err(e);
                    }
                    warn!(
                        operation,
                        tried,
                        attempts,
                        error = %e,
                        "Queue store write failed, retrying"
                    );
                    tokio::time::sleep(self.pause).await;
                    tried += 1;
                }
            }
        }
    }
}
