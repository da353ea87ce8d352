#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taaza_mail::{
    Clock, EmailJob, HandlebarsRenderer, JobProcessor, MailError, MailResult, MailTransport,
    ManualClock, MemoryQueueStore, MemoryRateLimitBackend, MessageComposer, QueueStats,
    QueueStore, RateLimiter, RetryPolicy, StoreRetry,
};
use tokio::sync::Semaphore;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
}

/// Transport that records sends, fails a set number of times first, and can
/// be gated to hold workers busy.
#[derive(Default)]
pub struct ScriptedTransport {
    pub sent: Mutex<Vec<(String, String, String)>>,
    failures_left: AtomicU32,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> MailResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.map(|p| p.forget()).ok();
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(MailError::Transport("451 temporary local problem".into()));
        }

        self.sent
            .lock()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Store in front of a [`MemoryQueueStore`] whose writes and pops can be
/// made to fail a set number of times.
pub struct FlakyStore {
    inner: Arc<MemoryQueueStore>,
    enqueue_failures: AtomicU32,
    dequeue_failures: AtomicU32,
    dead_letter_failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryQueueStore>) -> Self {
        Self {
            inner,
            enqueue_failures: AtomicU32::new(0),
            dequeue_failures: AtomicU32::new(0),
            dead_letter_failures: AtomicU32::new(0),
        }
    }

    pub fn fail_enqueues(&self, n: u32) {
        self.enqueue_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_dequeues(&self, n: u32) {
        self.dequeue_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_dead_letters(&self, n: u32) {
        self.dead_letter_failures.store(n, Ordering::SeqCst);
    }

    pub fn pending_dequeue_failures(&self) -> u32 {
        self.dequeue_failures.load(Ordering::SeqCst)
    }
}

fn unavailable() -> MailError {
    MailError::QueueUnavailable("connection reset by peer".into())
}

#[async_trait]
impl QueueStore for FlakyStore {
    async fn enqueue(&self, job: &EmailJob) -> MailResult<()> {
        if take_one(&self.enqueue_failures) {
            return Err(unavailable());
        }
        self.inner.enqueue(job).await
    }

    async fn dequeue_due(&self) -> MailResult<Option<EmailJob>> {
        if take_one(&self.dequeue_failures) {
            return Err(unavailable());
        }
        self.inner.dequeue_due().await
    }

    async fn dead_letter(&self, job: &EmailJob) -> MailResult<()> {
        if take_one(&self.dead_letter_failures) {
            return Err(unavailable());
        }
        self.inner.dead_letter(job).await
    }

    async fn stats(&self) -> MailResult<QueueStats> {
        self.inner.stats().await
    }

    async fn dead_letters(&self, limit: usize) -> MailResult<Vec<EmailJob>> {
        self.inner.dead_letters(limit).await
    }

    async fn health_check(&self) -> MailResult<()> {
        self.inner.health_check().await
    }
}

/// Memory store, clock, and processor wired the way the server wires them.
/// Workers see the store through `flaky`; producers write to `store` directly.
pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<MemoryQueueStore>,
    pub flaky: Arc<FlakyStore>,
    pub transport: Arc<ScriptedTransport>,
    pub processor: Arc<JobProcessor>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        let clock = ManualClock::new(start_time());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryQueueStore::new(
            shared_clock.clone(),
            Duration::from_millis(20),
        ));
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let transport = Arc::new(transport);
        let processor = Arc::new(
            JobProcessor::new(
                flaky.clone(),
                RateLimiter::new(Arc::new(MemoryRateLimitBackend::new(shared_clock.clone()))),
                MessageComposer::new(
                    Arc::new(HandlebarsRenderer::builtin().unwrap()),
                    "https://taaza.in",
                ),
                transport.clone(),
                RetryPolicy::default(),
                shared_clock,
            )
            .with_store_retry(StoreRetry {
                attempts: 3,
                pause: Duration::from_millis(5),
            }),
        );

        Self {
            clock,
            store,
            flaky,
            transport,
            processor,
        }
    }

    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
