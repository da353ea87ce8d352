//! Redis queue store implementation.

use super::{create_pool, RedisKeys};
use crate::clock::Clock;
use crate::error::{MailError, MailResult};
use crate::job::EmailJob;
use crate::store::{QueueStats, QueueStore};
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::{AsyncCommands, Script};
use std::sync::Arc;
use std::time::Duration;
use taaza_config::RedisConfig;
use tracing::{debug, error, info};

/// Moves due members of KEYS[1] onto KEYS[2] in score order.
const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, member in ipairs(due) do
    redis.call('ZREM', KEYS[1], member)
    redis.call('LPUSH', KEYS[2], member)
end
return #due
";

/// Shortest blocking pop. `BRPOP` with a zero timeout never returns.
const MIN_DEQUEUE_WAIT: Duration = Duration::from_millis(100);

/// Redis-backed queue store.
pub struct RedisQueueStore {
    pool: Pool,
    keys: RedisKeys,
    clock: Arc<dyn Clock>,
    dequeue_wait: Duration,
    promote: Script,
}

impl RedisQueueStore {
    /// Wrap an existing pool. `dequeue_wait` is raised to at least 100ms.
    pub fn new(pool: Pool, keys: RedisKeys, clock: Arc<dyn Clock>, dequeue_wait: Duration) -> Self {
        Self {
            pool,
            keys,
            clock,
            dequeue_wait: dequeue_wait.max(MIN_DEQUEUE_WAIT),
            promote: Script::new(PROMOTE_DUE_SCRIPT),
        }
    }

    /// Create the pool, verify connectivity, and build the store.
    pub async fn open(
        config: &RedisConfig,
        clock: Arc<dyn Clock>,
        dequeue_wait: Duration,
    ) -> MailResult<Self> {
        let pool = create_pool(config).await?;
        info!(prefix = %config.key_prefix, "Opened Redis email queue");
        Ok(Self::new(
            pool,
            RedisKeys::new(&config.key_prefix),
            clock,
            dequeue_wait,
        ))
    }

    /// The underlying pool, shared with the Redis rate-limit backend.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Key builder in use.
    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> MailResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    /// Move due scheduled jobs to the immediate queue. Returns how many moved.
    pub async fn promote_due(&self) -> MailResult<u64> {
        let mut conn = self.conn().await?;
        let now = self.clock.now().timestamp_millis();

        let moved: u64 = self
            .promote
            .key(self.keys.scheduled())
            .key(self.keys.queue())
            .arg(now)
            .invoke_async(&mut *conn)
            .await?;

        if moved > 0 {
            debug!(count = moved, "Promoted scheduled jobs");
        }

        Ok(moved)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, job: &EmailJob) -> MailResult<()> {
        let mut conn = self.conn().await?;
        let job_json = job.to_json()?;
        let now = self.clock.now();

        match job.not_before.filter(|_| !job.is_due(now)) {
            Some(at) => {
                let _: () = conn
                    .zadd(self.keys.scheduled(), &job_json, at.timestamp_millis())
                    .await?;
                debug!(job_id = %job.id, not_before = %at, "Scheduled job");
            }
            None => {
                let _: () = conn.lpush(self.keys.queue(), &job_json).await?;
                debug!(job_id = %job.id, "Enqueued job");
            }
        }

        Ok(())
    }

    async fn dequeue_due(&self) -> MailResult<Option<EmailJob>> {
        self.promote_due().await?;

        let mut conn = self.conn().await?;
        let popped: Option<(String, String)> = conn
            .brpop(self.keys.queue(), self.dequeue_wait.as_secs_f64())
            .await?;

        let Some((_, job_json)) = popped else {
            return Ok(None);
        };

        match EmailJob::from_json(&job_json) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(error = %e, "Discarding malformed job into dead-letter list");
                let _: () = conn.lpush(self.keys.dead_letter(), &job_json).await?;
                Ok(None)
            }
        }
    }

    async fn dead_letter(&self, job: &EmailJob) -> MailResult<()> {
        let mut conn = self.conn().await?;
        let job_json = job.to_json()?;
        let _: () = conn.lpush(self.keys.dead_letter(), &job_json).await?;
        Ok(())
    }

    async fn stats(&self) -> MailResult<QueueStats> {
        let mut conn = self.conn().await?;
        let (queued, scheduled, dead_letter): (u64, u64, u64) = redis::pipe()
            .llen(self.keys.queue())
            .zcard(self.keys.scheduled())
            .llen(self.keys.dead_letter())
            .query_async(&mut *conn)
            .await?;

        Ok(QueueStats {
            queued,
            scheduled,
            dead_letter,
        })
    }

    async fn dead_letters(&self, limit: usize) -> MailResult<Vec<EmailJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;
        let stop = isize::try_from(limit - 1)
            .map_err(|_| MailError::Validation(format!("limit too large: {limit}")))?;
        let raw: Vec<String> = conn.lrange(self.keys.dead_letter(), 0, stop).await?;

        Ok(raw
            .iter()
            .filter_map(|json| match EmailJob::from_json(json) {
                Ok(job) => Some(job),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable dead-letter entry");
                    None
                }
            })
            .collect())
    }

    async fn health_check(&self) -> MailResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    async fn close(&self) {
        info!("Closing Redis email queue");
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use deadpool_redis::{Config, Runtime};

    fn unconnected_pool() -> Pool {
        Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(Runtime::Tokio1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_zero_dequeue_wait_is_raised() {
        let store = RedisQueueStore::new(
            unconnected_pool(),
            RedisKeys::default(),
            Arc::new(SystemClock),
            Duration::ZERO,
        );
        assert_eq!(store.dequeue_wait, MIN_DEQUEUE_WAIT);
    }

    #[tokio::test]
    async fn test_longer_dequeue_wait_is_kept() {
        let store = RedisQueueStore::new(
            unconnected_pool(),
            RedisKeys::default(),
            Arc::new(SystemClock),
            Duration::from_secs(5),
        );
        assert_eq!(store.dequeue_wait, Duration::from_secs(5));
    }
}
