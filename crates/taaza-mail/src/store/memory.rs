//! In-process queue store with the same semantics as the Redis store.

use super::{QueueStats, QueueStore};
use crate::clock::Clock;
use crate::error::MailResult;
use crate::job::EmailJob;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

#[derive(Default)]
struct State {
    queue: VecDeque<EmailJob>,
    /// Keyed by (`not_before` millis, insertion sequence).
    scheduled: BTreeMap<(i64, u64), EmailJob>,
    dead: Vec<EmailJob>,
    seq: u64,
}

impl State {
    fn promote_due(&mut self, now_ms: i64) -> usize {
        let later = self.scheduled.split_off(&(now_ms.saturating_add(1), 0));
        let due = std::mem::replace(&mut self.scheduled, later);
        let count = due.len();
        self.queue.extend(due.into_values());
        count
    }
}

/// Queue store held in memory. Used by tests and single-process development.
pub struct MemoryQueueStore {
    state: Mutex<State>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    dequeue_wait: Duration,
}

impl MemoryQueueStore {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>, dequeue_wait: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            clock,
            dequeue_wait,
        }
    }

    /// Jobs in the immediate queue, head first.
    pub fn queued(&self) -> Vec<EmailJob> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Jobs in the scheduled set, earliest first.
    pub fn scheduled(&self) -> Vec<EmailJob> {
        self.state.lock().scheduled.values().cloned().collect()
    }

    /// Dead-lettered jobs, oldest first.
    pub fn dead(&self) -> Vec<EmailJob> {
        self.state.lock().dead.clone()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, job: &EmailJob) -> MailResult<()> {
        let now = self.clock.now();
        {
            let mut state = self.state.lock();
            match job.not_before.filter(|_| !job.is_due(now)) {
                Some(at) => {
                    state.seq += 1;
                    let key = (at.timestamp_millis(), state.seq);
                    state.scheduled.insert(key, job.clone());
                    debug!(job_id = %job.id, not_before = %at, "Scheduled job");
                }
                None => {
                    state.queue.push_back(job.clone());
                    debug!(job_id = %job.id, "Enqueued job");
                }
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_due(&self) -> MailResult<Option<EmailJob>> {
        let deadline = Instant::now() + self.dequeue_wait;
        loop {
            {
                let now_ms = self.clock.now().timestamp_millis();
                let mut state = self.state.lock();
                let moved = state.promote_due(now_ms);
                if moved > 0 {
                    debug!(count = moved, "Promoted scheduled jobs");
                }
                if let Some(job) = state.queue.pop_front() {
                    return Ok(Some(job));
                }
            }

            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn dead_letter(&self, job: &EmailJob) -> MailResult<()> {
        self.state.lock().dead.push(job.clone());
        Ok(())
    }

    async fn stats(&self) -> MailResult<QueueStats> {
        let state = self.state.lock();
        Ok(QueueStats {
            queued: state.queue.len() as u64,
            scheduled: state.scheduled.len() as u64,
            dead_letter: state.dead.len() as u64,
        })
    }

    async fn dead_letters(&self, limit: usize) -> MailResult<Vec<EmailJob>> {
        Ok(self
            .state
            .lock()
            .dead
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> MailResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::job::EmailKind;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn store(clock: &ManualClock) -> MemoryQueueStore {
        MemoryQueueStore::new(Arc::new(clock.clone()), Duration::from_millis(20))
    }

    fn job(recipient: &str) -> EmailJob {
        EmailJob::new(EmailKind::Welcome, recipient, start())
    }

    #[tokio::test]
    async fn test_immediate_queue_is_fifo() {
        let clock = ManualClock::new(start());
        let store = store(&clock);
        store.enqueue(&job("a@x.com")).await.unwrap();
        store.enqueue(&job("b@x.com")).await.unwrap();

        assert_eq!(store.dequeue_due().await.unwrap().unwrap().recipient, "a@x.com");
        assert_eq!(store.dequeue_due().await.unwrap().unwrap().recipient, "b@x.com");
        assert!(store.dequeue_due().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scheduled_job_hidden_until_due() {
        let clock = ManualClock::new(start());
        let store = store(&clock);
        let scheduled = job("a@x.com").not_before(start() + ChronoDuration::minutes(10));
        store.enqueue(&scheduled).await.unwrap();

        assert_eq!(store.stats().await.unwrap().scheduled, 1);
        assert!(store.dequeue_due().await.unwrap().is_none());

        clock.advance(ChronoDuration::minutes(10));
        let popped = store.dequeue_due().await.unwrap().unwrap();
        assert_eq!(popped.id, scheduled.id);
        assert_eq!(store.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_due_jobs_promoted_in_schedule_order() {
        let clock = ManualClock::new(start());
        let store = store(&clock);
        let late = job("late@x.com").not_before(start() + ChronoDuration::minutes(9));
        let early = job("early@x.com").not_before(start() + ChronoDuration::minutes(4));
        store.enqueue(&late).await.unwrap();
        store.enqueue(&early).await.unwrap();

        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(store.dequeue_due().await.unwrap().unwrap().id, early.id);
        assert_eq!(store.dequeue_due().await.unwrap().unwrap().id, late.id);
    }

    #[tokio::test]
    async fn test_past_schedule_goes_to_immediate_queue() {
        let clock = ManualClock::new(start());
        let store = store(&clock);
        let overdue = job("a@x.com").not_before(start() - ChronoDuration::minutes(1));
        store.enqueue(&overdue).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.scheduled, 0);
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let clock = ManualClock::new(start());
        let store = Arc::new(MemoryQueueStore::new(
            Arc::new(clock.clone()),
            Duration::from_secs(5),
        ));

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.dequeue_due().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.enqueue(&job("a@x.com")).await.unwrap();

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(popped.unwrap().recipient, "a@x.com");
    }

    #[tokio::test]
    async fn test_dead_letters_newest_first() {
        let clock = ManualClock::new(start());
        let store = store(&clock);
        for recipient in ["a@x.com", "b@x.com", "c@x.com"] {
            store.dead_letter(&job(recipient)).await.unwrap();
        }

        let recent: Vec<_> = store
            .dead_letters(2)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.recipient)
            .collect();
        assert_eq!(recent, vec!["c@x.com", "b@x.com"]);
        assert_eq!(store.stats().await.unwrap().dead_letter, 3);
    }
}
