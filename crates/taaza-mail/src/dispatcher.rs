//! Dispatcher: moves due jobs from the store to idle workers.

use crate::job::EmailJob;
use crate::metrics::MailMetrics;
use crate::store::{QueueStore, StoreRetry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// A job handed to a worker, with the permit marking that worker busy.
pub(crate) struct Handoff {
    pub(crate) job: EmailJob,
    pub(crate) permit: OwnedSemaphorePermit,
}

/// Pull loop feeding the worker pool.
pub(crate) struct Dispatcher {
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) idle: Arc<Semaphore>,
    pub(crate) handoff: mpsc::Sender<Handoff>,
    pub(crate) shutdown: broadcast::Receiver<()>,
    pub(crate) store_error_pause: Duration,
    pub(crate) saturation_pause: Duration,
    pub(crate) store_retry: StoreRetry,
    pub(crate) requeued_busy: Arc<AtomicU64>,
    pub(crate) lost: Arc<AtomicU64>,
    pub(crate) stopping: bool,
}

impl Dispatcher {
    /// Run until the stop signal. The signal is only checked between
    /// iterations so a pop in progress always completes.
    pub(crate) async fn run(mut self) {
        info!("Email dispatcher started");

        while !self.stop_requested() {
            let job = match self.store.dequeue_due().await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Failed to dequeue email job");
                    MailMetrics::store_error("dequeue");
                    self.pause(self.store_error_pause).await;
                    continue;
                }
            };

            MailMetrics::dequeued();

            match self.idle.clone().try_acquire_owned() {
                Ok(permit) => {
                    debug!(job_id = %job.id, "Dispatching email job");
                    if let Err(mpsc::error::SendError(handoff)) =
                        self.handoff.send(Handoff { job, permit }).await
                    {
                        warn!(job_id = %handoff.job.id, "Workers gone, returning job to the queue");
                        self.requeue(&handoff.job).await;
                        break;
                    }
                }
                Err(_) => {
                    debug!(job_id = %job.id, "All workers busy, requeueing email job");
                    if self.requeue(&job).await {
                        self.requeued_busy.fetch_add(1, Ordering::Relaxed);
                        MailMetrics::requeued_busy();
                    }
                    self.pause(self.saturation_pause).await;
                }
            }
        }

        info!("Email dispatcher stopped");
    }

    fn stop_requested(&mut self) -> bool {
        if !self.stopping && !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty)) {
            self.stopping = true;
        }
        self.stopping
    }

    /// Sleep, cut short by the stop signal.
    async fn pause(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = self.shutdown.recv() => self.stopping = true,
        }
    }

    /// Put a job back untouched. Returns false if the job was lost.
    async fn requeue(&self, job: &EmailJob) -> bool {
        let store = &self.store;
        match self
            .store_retry
            .run("requeue", move || store.enqueue(job))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to return email job to the queue, job lost");
                self.lost.fetch_add(1, Ordering::Relaxed);
                MailMetrics::lost(job.kind, "requeue");
                false
            }
        }
    }
}
