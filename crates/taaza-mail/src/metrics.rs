//! Metrics for email queue monitoring.

use crate::job::EmailKind;
use crate::store::QueueStats;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the email queue.
pub mod names {
    /// Total jobs accepted by the producer.
    pub const EMAILS_ENQUEUED_TOTAL: &str = "taaza_email_enqueued_total";
    /// Total jobs pulled by the dispatcher.
    pub const EMAILS_DEQUEUED_TOTAL: &str = "taaza_email_dequeued_total";
    /// Total emails delivered.
    pub const EMAILS_DELIVERED_TOTAL: &str = "taaza_email_delivered_total";
    /// Total failed attempts rescheduled.
    pub const EMAILS_RETRIED_TOTAL: &str = "taaza_email_retried_total";
    /// Total jobs moved to the dead-letter list.
    pub const EMAILS_DEAD_LETTERED_TOTAL: &str = "taaza_email_dead_lettered_total";
    /// Total jobs that could not be written back to the store.
    pub const EMAILS_LOST_TOTAL: &str = "taaza_email_lost_total";
    /// Total jobs put back because every worker was busy.
    pub const EMAILS_REQUEUED_BUSY_TOTAL: &str = "taaza_email_requeued_busy_total";
    /// Total sends refused by the rate limiter.
    pub const EMAILS_RATE_LIMITED_TOTAL: &str = "taaza_email_rate_limited_total";
    /// Total queue store errors.
    pub const STORE_ERRORS_TOTAL: &str = "taaza_email_store_errors_total";

    /// Jobs ready to run.
    pub const QUEUE_DEPTH: &str = "taaza_email_queue_depth";
    /// Jobs waiting for their schedule.
    pub const SCHEDULED_DEPTH: &str = "taaza_email_scheduled_depth";
    /// Dead-letter list size.
    pub const DEAD_LETTER_DEPTH: &str = "taaza_email_dead_letter_depth";

    /// Workers currently delivering.
    pub const WORKERS_ACTIVE: &str = "taaza_email_workers_active";
    /// Time spent on one delivery attempt, in seconds.
    pub const DELIVERY_DURATION_SECONDS: &str = "taaza_email_delivery_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::EMAILS_ENQUEUED_TOTAL, "Total number of email jobs enqueued");
    describe_counter!(names::EMAILS_DEQUEUED_TOTAL, "Total number of email jobs dequeued");
    describe_counter!(names::EMAILS_DELIVERED_TOTAL, "Total number of emails delivered");
    describe_counter!(names::EMAILS_RETRIED_TOTAL, "Total number of delivery retries scheduled");
    describe_counter!(
        names::EMAILS_DEAD_LETTERED_TOTAL,
        "Total number of email jobs sent to the dead-letter list"
    );
    describe_counter!(
        names::EMAILS_LOST_TOTAL,
        "Total number of jobs dropped after repeated store write failures"
    );
    describe_counter!(
        names::EMAILS_REQUEUED_BUSY_TOTAL,
        "Total number of jobs requeued because no worker was idle"
    );
    describe_counter!(
        names::EMAILS_RATE_LIMITED_TOTAL,
        "Total number of sends refused by the per-recipient rate limit"
    );
    describe_counter!(names::STORE_ERRORS_TOTAL, "Total number of queue store errors");

    describe_gauge!(names::QUEUE_DEPTH, "Current number of jobs ready to run");
    describe_gauge!(names::SCHEDULED_DEPTH, "Current number of scheduled jobs");
    describe_gauge!(names::DEAD_LETTER_DEPTH, "Current size of the dead-letter list");
    describe_gauge!(names::WORKERS_ACTIVE, "Number of workers currently delivering");

    describe_histogram!(
        names::DELIVERY_DURATION_SECONDS,
        "Delivery attempt duration in seconds"
    );
}

/// Email queue metrics recorder.
#[derive(Clone)]
pub struct MailMetrics;

impl MailMetrics {
    /// Record a job accepted by the producer.
    pub fn enqueued(kind: EmailKind) {
        counter!(names::EMAILS_ENQUEUED_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    /// Record a job pulled by the dispatcher.
    pub fn dequeued() {
        counter!(names::EMAILS_DEQUEUED_TOTAL).increment(1);
    }

    /// Record a delivered email.
    pub fn delivered(kind: EmailKind, duration: Duration) {
        counter!(names::EMAILS_DELIVERED_TOTAL, "kind" => kind.as_str()).increment(1);
        histogram!(
            names::DELIVERY_DURATION_SECONDS,
            "kind" => kind.as_str(),
            "status" => "delivered"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed attempt that was rescheduled.
    pub fn retried(kind: EmailKind, attempt: u32, duration: Duration) {
        counter!(
            names::EMAILS_RETRIED_TOTAL,
            "kind" => kind.as_str(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
        histogram!(
            names::DELIVERY_DURATION_SECONDS,
            "kind" => kind.as_str(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job moved to the dead-letter list.
    pub fn dead_lettered(kind: EmailKind) {
        counter!(names::EMAILS_DEAD_LETTERED_TOTAL, "kind" => kind.as_str()).increment(1);
    }

    /// Record a job that could not be returned to the store.
    pub fn lost(kind: EmailKind, operation: &'static str) {
        counter!(
            names::EMAILS_LOST_TOTAL,
            "kind" => kind.as_str(),
            "operation" => operation
        )
        .increment(1);
    }

    /// Record a job requeued because the pool was saturated.
    pub fn requeued_busy() {
        counter!(names::EMAILS_REQUEUED_BUSY_TOTAL).increment(1);
    }

    /// Record a send refused by the rate limiter.
    pub fn rate_limited() {
        counter!(names::EMAILS_RATE_LIMITED_TOTAL).increment(1);
    }

    /// Record a store error.
    pub fn store_error(operation: &'static str) {
        counter!(names::STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
    }

    /// Update the active worker gauge.
    #[allow(clippy::cast_precision_loss)]
    pub fn workers_active(active: usize) {
        gauge!(names::WORKERS_ACTIVE).set(active as f64);
    }

    /// Update queue size gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn queue_sizes(stats: &QueueStats) {
        gauge!(names::QUEUE_DEPTH).set(stats.queued as f64);
        gauge!(names::SCHEDULED_DEPTH).set(stats.scheduled as f64);
        gauge!(names::DEAD_LETTER_DEPTH).set(stats.dead_letter as f64);
    }
}
