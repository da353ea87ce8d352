//! Redis-backed queue store and rate-limit counters.

mod store;

pub use store::RedisQueueStore;

use crate::error::{MailError, MailResult};
use deadpool_redis::{Config, Pool, Runtime};
use taaza_config::RedisConfig;
use tracing::info;

/// Create a Redis connection pool and check it answers PING.
pub async fn create_pool(config: &RedisConfig) -> MailResult<Pool> {
    info!("Creating Redis connection pool for email queue...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| MailError::Configuration(format!("Invalid Redis config: {e}")))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| MailError::Configuration(format!("Failed to create pool: {e}")))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis key builder for the email queue.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Immediate queue (list, LPUSH in / BRPOP out).
    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    /// Scheduled jobs (sorted set scored by `not_before` epoch millis).
    pub fn scheduled(&self) -> String {
        format!("{}:scheduled", self.prefix)
    }

    /// Dead-letter list, newest at the head.
    pub fn dead_letter(&self) -> String {
        format!("{}:dead_letter", self.prefix)
    }

    /// Fixed-window counter for a rate-limit key.
    pub fn rate_limit(&self, key: &str) -> String {
        format!("{}:rate_limit:{}", self.prefix, key)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::new("taaza:email")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_keys() {
        let keys = RedisKeys::new("test");

        assert_eq!(keys.queue(), "test:queue");
        assert_eq!(keys.scheduled(), "test:scheduled");
        assert_eq!(keys.dead_letter(), "test:dead_letter");
        assert_eq!(keys.rate_limit("a@x.com"), "test:rate_limit:a@x.com");
    }

    #[test]
    fn test_default_prefix() {
        assert_eq!(RedisKeys::default().queue(), "taaza:email:queue");
    }
}
