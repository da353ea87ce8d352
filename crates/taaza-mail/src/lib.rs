//! Taaza Mail - Email Job Queue
//!
//! A durable, rate-limited, retrying email queue:
//! - Immediate FIFO queue, scheduled set, and dead-letter list in Redis
//! - Fixed-window per-recipient rate limiting that fails open
//! - Quadratic backoff between attempts, dead-lettering at the ceiling
//! - Fixed-size worker pool fed by a single dispatcher
//! - Handlebars templates delivered over SMTP
//!
//! # Architecture
//!
//! ```text
//!  EmailService ──enqueue──▶ QueueStore ◀──reschedule / dead-letter──┐
//!                              │                                      │
//!                         dequeue_due                                 │
//!                              ▼                                      │
//!                         Dispatcher ──no idle worker──▶ requeue      │
//!                              │                                      │
//!                          hand-off                                   │
//!                              ▼                                      │
//!                      Worker (JobProcessor)                          │
//!             RateLimiter → MessageComposer → MailTransport           │
//!                              │                                      │
//!                       failure → RetryPolicy ────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let store: Arc<dyn QueueStore> = Arc::new(RedisQueueStore::open(&redis, clock.clone(), wait).await?);
//! let service = EmailService::new(store.clone(), clock.clone());
//! let job_id = service.otp("a@x.com", "Asha", "482913").await?;
//! ```

pub mod clock;
pub mod composer;
mod dispatcher;
pub mod error;
pub mod job;
pub mod metrics;
pub mod pool;
pub mod processor;
pub mod rate_limiter;
pub mod redis;
pub mod retry;
pub mod service;
pub mod store;
pub mod template;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::{ComposedEmail, MessageComposer};
pub use error::{MailError, MailResult};
pub use job::{EmailJob, EmailKind, JobId, Payload};
pub use metrics::{register_metrics, MailMetrics};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};
pub use processor::{JobProcessor, Outcome, RecipientLimit};
pub use rate_limiter::{
    MemoryRateLimitBackend, RateLimitBackend, RateLimiter, RedisRateLimitBackend,
};
pub use crate::redis::{RedisKeys, RedisQueueStore};
pub use retry::{RetryDecision, RetryPolicy};
pub use service::{EmailService, SendEmailRequest};
pub use store::{MemoryQueueStore, QueueStats, QueueStore, StoreRetry};
pub use template::{HandlebarsRenderer, TemplateRenderer};
pub use transport::{MailTransport, SmtpTransport};
