//! Retry policy for failed deliveries.

use crate::job::EmailJob;
use chrono::{DateTime, Utc};
use std::time::Duration;
use taaza_config::{BackoffStrategy, RetryConfig};

/// What to do with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put it back in the store to run at `not_before`.
    Retry {
        /// Earliest next attempt.
        not_before: DateTime<Utc>,
    },
    /// No attempts remain.
    DeadLetter,
}

/// Backoff policy.
///
/// The default reproduces the service's historic behavior: a delay of
/// `attempt²` minutes, no cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff curve.
    pub strategy: BackoffStrategy,

    /// Delay unit.
    pub base_delay: Duration,

    /// Upper bound on a single delay.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::quadratic(Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// `attempt² × base`.
    pub fn quadratic(base_delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Quadratic,
            base_delay,
            max_delay: None,
        }
    }

    /// `2^(attempt-1) × base`.
    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay,
            max_delay: None,
        }
    }

    /// `base` after every failure.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay: delay,
            max_delay: None,
        }
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Delay before the attempt following failure number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor: u32 = match self.strategy {
            BackoffStrategy::Quadratic => attempt.saturating_mul(attempt),
            BackoffStrategy::Exponential => 2u32.saturating_pow(attempt - 1),
            BackoffStrategy::Fixed => 1,
        };

        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Record a failed attempt on `job` and decide its fate.
    ///
    /// Increments `attempt_count` and stores `error` as `last_error`. When the
    /// ceiling is reached the job is dead-lettered; otherwise `not_before` is
    /// set to `now` plus the backoff delay.
    pub fn on_failure(&self, job: &mut EmailJob, error: &str, now: DateTime<Utc>) -> RetryDecision {
        job.attempt_count = job.attempt_count.saturating_add(1).min(job.max_attempts);
        job.last_error = Some(error.to_string());

        if job.is_exhausted() {
            return RetryDecision::DeadLetter;
        }

        let delay = chrono::Duration::from_std(self.delay_for(job.attempt_count))
            .unwrap_or(chrono::Duration::MAX);
        let not_before = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        job.not_before = Some(match job.not_before {
            Some(previous) => previous.max(not_before),
            None => not_before,
        });

        RetryDecision::Retry {
            not_before: job.not_before.unwrap_or(not_before),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_delay: config.max_delay_secs.map(Duration::from_secs),
        }
    }
}
