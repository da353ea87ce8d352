//! Worker pool for delivering email jobs.

use crate::dispatcher::{Dispatcher, Handoff};
use crate::error::{MailError, MailResult};
use crate::metrics::MailMetrics;
use crate::processor::{JobProcessor, Outcome};
use crate::store::QueueStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taaza_config::EmailConfig;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub worker_count: usize,

    /// Dispatcher pause after a store error.
    pub store_error_pause: Duration,

    /// Dispatcher pause after requeueing a job because every worker was busy.
    pub saturation_pause: Duration,

    /// How long shutdown waits for in-flight deliveries.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            store_error_pause: Duration::from_secs(5),
            saturation_pause: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EmailConfig> for WorkerPoolConfig {
    fn from(config: &EmailConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            store_error_pause: config.store_error_pause(),
            saturation_pause: config.saturation_pause(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    requeued_busy: Arc<AtomicU64>,
    lost: Arc<AtomicU64>,
}

struct Running {
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    inbox: Arc<tokio::sync::Mutex<mpsc::Receiver<Handoff>>>,
}

/// Fixed-size pool of workers fed by one dispatcher.
///
/// Each worker handles one job at a time. A worker is idle when its permit
/// is free; the dispatcher takes a permit without waiting and requeues the
/// job if none is free.
pub struct WorkerPool {
    id: String,
    config: WorkerPoolConfig,
    store: Arc<dyn QueueStore>,
    processor: Arc<JobProcessor>,
    idle: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
    counters: Arc<Counters>,
    tasks: Mutex<Option<Running>>,
}

impl WorkerPool {
    /// Create a stopped pool.
    pub fn new(processor: Arc<JobProcessor>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker_count = config.worker_count.max(1);

        Self {
            id: format!("email-pool-{}", Uuid::new_v4()),
            store: processor.store().clone(),
            processor,
            idle: Arc::new(Semaphore::new(worker_count)),
            config: WorkerPoolConfig {
                worker_count,
                ..config
            },
            shutdown_tx,
            running: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
            tasks: Mutex::new(None),
        }
    }

    /// Spawn the dispatcher and the workers.
    pub fn start(&self) -> MailResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MailError::Internal("Worker pool already running".to_string()));
        }

        info!(
            pool_id = %self.id,
            workers = self.config.worker_count,
            "Starting email worker pool"
        );

        let (tx, rx) = mpsc::channel(self.config.worker_count);
        let inbox = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..self.config.worker_count)
            .map(|index| {
                let worker_id = format!("{}-{}", self.id, index);
                tokio::spawn(
                    run_worker(
                        inbox.clone(),
                        self.shutdown_tx.subscribe(),
                        self.processor.clone(),
                        self.counters.clone(),
                        self.idle.clone(),
                        self.config.worker_count,
                    )
                    .instrument(tracing::info_span!("email_worker", worker_id = %worker_id)),
                )
            })
            .collect();

        let dispatcher = Dispatcher {
            store: self.store.clone(),
            idle: self.idle.clone(),
            handoff: tx,
            shutdown: self.shutdown_tx.subscribe(),
            store_error_pause: self.config.store_error_pause,
            saturation_pause: self.config.saturation_pause,
            store_retry: self.processor.store_retry(),
            requeued_busy: self.counters.requeued_busy.clone(),
            lost: self.counters.lost.clone(),
            stopping: false,
        };
        let dispatcher = tokio::spawn(
            dispatcher
                .run()
                .instrument(tracing::info_span!("email_dispatcher", pool_id = %self.id)),
        );

        *self.tasks.lock() = Some(Running {
            dispatcher,
            workers,
            inbox,
        });

        Ok(())
    }

    /// Stop the pool.
    ///
    /// Waits for the dispatcher's current pop, lets workers finish the job in
    /// hand (bounded by the shutdown timeout), then returns jobs that were
    /// handed off but never started to the store.
    pub async fn shutdown(&self) {
        let Some(running) = self.tasks.lock().take() else {
            return;
        };

        info!(pool_id = %self.id, "Stopping email worker pool...");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = running.dispatcher.await {
            error!(pool_id = %self.id, error = %e, "Dispatcher task failed");
        }

        let workers = running.workers;
        let joined = timeout(self.config.shutdown_timeout, async {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!(error = %e, "Worker task failed");
                }
            }
        })
        .await;
        if joined.is_err() {
            warn!(
                pool_id = %self.id,
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Workers did not finish before the shutdown timeout"
            );
        }

        let returned = self.return_unstarted(&running.inbox).await;

        self.running.store(false, Ordering::SeqCst);

        info!(
            pool_id = %self.id,
            returned,
            delivered = self.counters.delivered.load(Ordering::Relaxed),
            retried = self.counters.retried.load(Ordering::Relaxed),
            dead_lettered = self.counters.dead_lettered.load(Ordering::Relaxed),
            lost = self.counters.lost.load(Ordering::Relaxed),
            "Email worker pool stopped"
        );
    }

    /// Close the hand-off channel and put back every job that was handed
    /// off but never started. Returns how many went back.
    async fn return_unstarted(&self, inbox: &tokio::sync::Mutex<mpsc::Receiver<Handoff>>) -> u64 {
        let store_retry = self.processor.store_retry();
        let mut returned = 0u64;
        let mut inbox = inbox.lock().await;
        inbox.close();
        while let Ok(Handoff { job, permit }) = inbox.try_recv() {
            drop(permit);
            let store = &self.store;
            let unstarted = &job;
            match store_retry
                .run("return_unstarted", move || store.enqueue(unstarted))
                .await
            {
                Ok(()) => returned += 1,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to return unstarted job, job lost");
                    self.counters.lost.fetch_add(1, Ordering::Relaxed);
                    MailMetrics::lost(job.kind, "return_unstarted");
                }
            }
        }
        returned
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Workers currently holding a job.
    pub fn active_workers(&self) -> usize {
        self.config.worker_count - self.idle.available_permits()
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            worker_count: self.config.worker_count,
            active_workers: self.active_workers(),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            requeued_busy: self.counters.requeued_busy.load(Ordering::Relaxed),
            lost: self.counters.lost.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    inbox: Arc<tokio::sync::Mutex<mpsc::Receiver<Handoff>>>,
    mut shutdown: broadcast::Receiver<()>,
    processor: Arc<JobProcessor>,
    counters: Arc<Counters>,
    idle: Arc<Semaphore>,
    worker_count: usize,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            handoff = async { inbox.lock().await.recv().await } => handoff,
        };
        let Some(Handoff { job, permit }) = next else {
            break;
        };

        MailMetrics::workers_active(worker_count - idle.available_permits());
        match processor.process(job).await {
            Outcome::Delivered { .. } => counters.delivered.fetch_add(1, Ordering::Relaxed),
            Outcome::Retried { .. } => counters.retried.fetch_add(1, Ordering::Relaxed),
            Outcome::DeadLettered => counters.dead_lettered.fetch_add(1, Ordering::Relaxed),
            Outcome::Lost => counters.lost.fetch_add(1, Ordering::Relaxed),
        };
        drop(permit);
        MailMetrics::workers_active(worker_count - idle.available_permits());
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured workers.
    pub worker_count: usize,

    /// Workers currently delivering.
    pub active_workers: usize,

    /// Emails delivered.
    pub delivered: u64,

    /// Failed attempts rescheduled.
    pub retried: u64,

    /// Jobs moved to the dead-letter list.
    pub dead_lettered: u64,

    /// Jobs put back because every worker was busy.
    pub requeued_busy: u64,

    /// Jobs dropped after every write back to the store failed.
    pub lost: u64,
}
