//! Fixed-window rate limiting.
//!
//! Each key gets a counter that starts at 1 on the first hit of a window and
//! expires when the window ends. A hit is allowed while the counter is at or
//! below the limit. Windows do not slide: a burst straddling a boundary can
//! see up to twice the limit.
//!
//! The limiter fails open. If the backend errors, the hit is allowed and a
//! warning is logged.

use crate::clock::Clock;
use crate::error::MailResult;
use crate::metrics::MailMetrics;
use crate::redis::RedisKeys;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use parking_lot::Mutex;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Counter storage for the limiter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Count one hit against `key` and return the count in the current window.
    async fn hit(&self, key: &str, window: Duration) -> MailResult<u64>;
}

/// INCR, and start the window's expiry on the first hit.
const HIT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Counters kept in Redis as `<prefix>:rate_limit:<key>` with a TTL.
pub struct RedisRateLimitBackend {
    pool: Pool,
    keys: RedisKeys,
    script: Script,
}

impl RedisRateLimitBackend {
    /// Create a backend over an existing pool.
    pub fn new(pool: Pool, keys: RedisKeys) -> Self {
        Self {
            pool,
            keys,
            script: Script::new(HIT_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisRateLimitBackend {
    async fn hit(&self, key: &str, window: Duration) -> MailResult<u64> {
        let mut conn = self.pool.get().await?;
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let count: u64 = self
            .script
            .key(self.keys.rate_limit(key))
            .arg(window_ms)
            .invoke_async(&mut *conn)
            .await?;
        Ok(count)
    }
}

/// Counters kept in process memory.
pub struct MemoryRateLimitBackend {
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<String, (u64, DateTime<Utc>)>>,
}

impl MemoryRateLimitBackend {
    /// Create an empty backend.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RateLimitBackend for MemoryRateLimitBackend {
    async fn hit(&self, key: &str, window: Duration) -> MailResult<u64> {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let mut windows = self.windows.lock();
        let entry = windows.entry(key.to_string()).or_insert((0, now));

        if entry.0 == 0 || entry.1 <= now {
            *entry = (1, now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC));
        } else {
            entry.0 += 1;
        }

        Ok(entry.0)
    }
}

/// Fail-open fixed-window limiter.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    enabled: bool,
}

impl RateLimiter {
    /// Create an enabled limiter.
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self {
            backend,
            enabled: true,
        }
    }

    /// Create a limiter that allows everything.
    pub fn disabled(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self {
            backend,
            enabled: false,
        }
    }

    /// Count a hit against `key` and report whether it is within `limit` for `window`.
    ///
    /// Keys are compared case-insensitively.
    pub async fn allow(&self, key: &str, limit: u64, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }

        let key = key.trim().to_lowercase();
        match self.backend.hit(&key, window).await {
            Ok(count) => {
                let allowed = count <= limit;
                if !allowed {
                    debug!(key = %key, count, limit, "Rate limit exceeded");
                    MailMetrics::rate_limited();
                }
                allowed
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limiter unavailable, allowing");
                true
            }
        }
    }
}
