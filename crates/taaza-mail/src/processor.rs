//! One delivery attempt: rate limit, compose, send, then classify the result.

use crate::clock::Clock;
use crate::composer::MessageComposer;
use crate::error::{MailError, MailResult};
use crate::job::EmailJob;
use crate::metrics::MailMetrics;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{QueueStore, StoreRetry};
use crate::transport::MailTransport;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taaza_config::RateLimitConfig;
use tracing::{debug, error, info, warn};

/// What happened to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Sent. `attempts` counts the failures before this success.
    Delivered { attempts: u32 },
    /// Failed and put back for a later attempt.
    Retried { not_before: DateTime<Utc> },
    /// Failed with no attempts left.
    DeadLettered,
    /// Failed, and every write returning it to the store failed too.
    Lost,
}

/// Limit applied per recipient before every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipientLimit {
    /// Attempts allowed per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

impl Default for RecipientLimit {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(3600),
        }
    }
}

impl From<&RateLimitConfig> for RecipientLimit {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.per_recipient_limit,
            window: config.window(),
        }
    }
}

/// Runs delivery attempts and routes failures through the retry policy.
pub struct JobProcessor {
    store: Arc<dyn QueueStore>,
    limiter: RateLimiter,
    recipient_limit: RecipientLimit,
    composer: MessageComposer,
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
    store_retry: StoreRetry,
    clock: Arc<dyn Clock>,
}

impl JobProcessor {
    /// Create a processor with the default recipient limit.
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: RateLimiter,
        composer: MessageComposer,
        transport: Arc<dyn MailTransport>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            limiter,
            recipient_limit: RecipientLimit::default(),
            composer,
            transport,
            policy,
            store_retry: StoreRetry::default(),
            clock,
        }
    }

    /// Sets the per-recipient limit.
    #[must_use]
    pub fn with_recipient_limit(mut self, recipient_limit: RecipientLimit) -> Self {
        self.recipient_limit = recipient_limit;
        self
    }

    /// Sets how failed reschedule and dead-letter writes are retried.
    #[must_use]
    pub fn with_store_retry(mut self, store_retry: StoreRetry) -> Self {
        self.store_retry = store_retry;
        self
    }

    /// Tries and pause used for writes back to the store.
    pub fn store_retry(&self) -> StoreRetry {
        self.store_retry
    }

    /// The store jobs are returned to.
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Process one job. Never fails: every error ends in a retry or the
    /// dead-letter list, or in [`Outcome::Lost`] when the store rejects the
    /// write back after every try.
    pub async fn process(&self, mut job: EmailJob) -> Outcome {
        let started = Instant::now();
        debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt_count + 1, "Processing email job");

        match self.attempt(&job).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    kind = %job.kind,
                    to = %job.recipient,
                    attempts = job.attempt_count,
                    "Email delivered"
                );
                MailMetrics::delivered(job.kind, started.elapsed());
                Outcome::Delivered {
                    attempts: job.attempt_count,
                }
            }
            Err(e) => {
                let outcome = self.fail(&mut job, &e).await;
                if let Outcome::Retried { .. } = outcome {
                    MailMetrics::retried(job.kind, job.attempt_count, started.elapsed());
                }
                outcome
            }
        }
    }

    async fn attempt(&self, job: &EmailJob) -> MailResult<()> {
        let RecipientLimit { limit, window } = self.recipient_limit;
        if !self.limiter.allow(&job.recipient, limit, window).await {
            return Err(MailError::RateLimited {
                recipient: job.recipient.clone(),
            });
        }

        let email = self.composer.compose(job)?;
        self.transport
            .send(&job.recipient, &email.subject, &email.body)
            .await
    }

    async fn fail(&self, job: &mut EmailJob, err: &MailError) -> Outcome {
        let now = self.clock.now();
        match self.policy.on_failure(job, &err.to_string(), now) {
            RetryDecision::Retry { not_before } => {
                warn!(
                    job_id = %job.id,
                    error = %err,
                    attempt = job.attempt_count,
                    max_attempts = job.max_attempts,
                    retry_at = %not_before,
                    "Email attempt failed, retrying later"
                );
                let store = &self.store;
                let job: &EmailJob = job;
                if let Err(e) = self
                    .store_retry
                    .run("reschedule", move || store.enqueue(job))
                    .await
                {
                    error!(job_id = %job.id, error = %e, "Failed to reschedule email job, job lost");
                    MailMetrics::lost(job.kind, "reschedule");
                    return Outcome::Lost;
                }
                Outcome::Retried { not_before }
            }
            RetryDecision::DeadLetter => {
                warn!(
                    job_id = %job.id,
                    error = %err,
                    attempts = job.attempt_count,
                    "Email job exhausted its attempts, moving to dead-letter list"
                );
                let store = &self.store;
                let job: &EmailJob = job;
                if let Err(e) = self
                    .store_retry
                    .run("dead_letter", move || store.dead_letter(job))
                    .await
                {
                    error!(job_id = %job.id, error = %e, "Failed to dead-letter email job, job lost");
                    MailMetrics::lost(job.kind, "dead_letter");
                    return Outcome::Lost;
                }
                MailMetrics::dead_lettered(job.kind);
                Outcome::DeadLettered
            }
        }
    }
}
