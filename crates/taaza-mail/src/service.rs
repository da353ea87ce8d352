//! Producer side: validate submissions and put them on the queue.

use crate::clock::Clock;
use crate::error::{MailError, MailResult};
use crate::job::{EmailJob, EmailKind, JobId, Payload, DEFAULT_MAX_ATTEMPTS};
use crate::metrics::MailMetrics;
use crate::store::{QueueStats, QueueStore};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use taaza_core::{rules, Email};
use tracing::{error, info};

/// A request to send one email.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendEmailRequest {
    /// Email kind.
    #[serde(rename = "type", default)]
    pub kind: EmailKind,

    /// Recipient address.
    pub to: String,

    /// Subject override.
    #[serde(default)]
    pub subject: Option<String>,

    /// Template override.
    #[serde(rename = "template_name", default)]
    pub template: Option<String>,

    /// Template data. Values must be scalars.
    #[serde(default)]
    pub data: Payload,

    /// Deliver no earlier than this.
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

/// Accepts email submissions.
#[derive(Clone)]
pub struct EmailService {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl EmailService {
    /// Create a service writing to `store`.
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the attempt ceiling stamped on new jobs.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Validate and enqueue a request. Returns the new job's ID.
    ///
    /// Invalid requests fail with [`MailError::Validation`] and never reach the
    /// store; store failures surface as [`MailError::QueueUnavailable`].
    pub async fn submit(&self, request: SendEmailRequest) -> MailResult<JobId> {
        let job = self.build_job(request)?;

        self.store.enqueue(&job).await.map_err(|e| {
            error!(job_id = %job.id, error = %e, "Failed to enqueue email job");
            MailMetrics::store_error("enqueue");
            MailError::QueueUnavailable(e.to_string())
        })?;

        MailMetrics::enqueued(job.kind);
        info!(
            job_id = %job.id,
            kind = %job.kind,
            to = %job.recipient,
            scheduled_at = ?job.not_before,
            "Email job queued"
        );

        Ok(job.id)
    }

    /// Queue a one-time password email.
    pub async fn otp(&self, email: &str, name: &str, otp: &str) -> MailResult<JobId> {
        self.submit(SendEmailRequest {
            kind: EmailKind::Otp,
            to: email.to_string(),
            data: payload([("name", name), ("otp", otp)]),
            ..SendEmailRequest::default()
        })
        .await
    }

    /// Queue a welcome email.
    pub async fn welcome(&self, email: &str, name: &str) -> MailResult<JobId> {
        self.submit(SendEmailRequest {
            kind: EmailKind::Welcome,
            to: email.to_string(),
            data: payload([("name", name)]),
            ..SendEmailRequest::default()
        })
        .await
    }

    /// Queue a profile reminder, optionally held until `at`.
    pub async fn profile_reminder(
        &self,
        email: &str,
        name: &str,
        at: Option<DateTime<Utc>>,
    ) -> MailResult<JobId> {
        self.submit(SendEmailRequest {
            kind: EmailKind::ProfileReminder,
            to: email.to_string(),
            data: payload([("name", name)]),
            schedule_at: at,
            ..SendEmailRequest::default()
        })
        .await
    }

    /// Queue sizes.
    pub async fn stats(&self) -> MailResult<QueueStats> {
        let stats = self.store.stats().await?;
        MailMetrics::queue_sizes(&stats);
        Ok(stats)
    }

    /// Most recent dead-lettered jobs, newest first.
    pub async fn dead_letters(&self, limit: usize) -> MailResult<Vec<EmailJob>> {
        self.store.dead_letters(limit).await
    }

    /// Check the store is reachable.
    pub async fn health_check(&self) -> MailResult<()> {
        self.store.health_check().await
    }

    fn build_job(&self, request: SendEmailRequest) -> MailResult<EmailJob> {
        let recipient =
            Email::new(&request.to).map_err(|e| MailError::Validation(e.to_string()))?;

        if let Some((key, _)) = request
            .data
            .iter()
            .find(|(_, value)| matches!(value, Value::Array(_) | Value::Object(_)))
        {
            return Err(MailError::Validation(format!(
                "data.{key} must be a string, number, boolean, or null"
            )));
        }

        let subject = request.subject.unwrap_or_default().trim().to_string();
        let template = request.template.unwrap_or_default().trim().to_string();

        if !template.is_empty() && rules::template_name(&template).is_err() {
            return Err(MailError::Validation(format!(
                "Invalid template name: {template}"
            )));
        }

        match request.kind {
            EmailKind::Otp if !has_text(&request.data, "otp") => {
                return Err(MailError::Validation("data.otp is required".to_string()));
            }
            EmailKind::Generic if subject.is_empty() && template.is_empty() => {
                return Err(MailError::Validation(
                    "subject or template_name is required".to_string(),
                ));
            }
            _ => {}
        }

        let mut job = EmailJob::new(request.kind, recipient.as_str(), self.clock.now())
            .with_subject(subject)
            .with_template(template)
            .with_payload(request.data)
            .with_max_attempts(self.max_attempts);
        job.not_before = request.schedule_at;

        Ok(job)
    }
}

fn payload<const N: usize>(pairs: [(&str, &str); N]) -> Payload {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

fn has_text(data: &Payload, key: &str) -> bool {
    match data.get(key) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryQueueStore;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;
    use std::time::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn service() -> (EmailService, Arc<MemoryQueueStore>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryQueueStore::new(clock.clone(), Duration::from_millis(10)));
        (EmailService::new(store.clone(), clock), store)
    }

    fn request(value: Value) -> SendEmailRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_submit_normalizes_recipient() {
        let (service, store) = service();
        let id = service
            .submit(request(json!({
                "type": "welcome",
                "to": "  Asha@Taaza.IN ",
                "data": {"name": "Asha"}
            })))
            .await
            .unwrap();

        let queued = store.queued();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, id);
        assert_eq!(queued[0].recipient, "asha@taaza.in");
        assert_eq!(queued[0].attempt_count, 0);
        assert_eq!(queued[0].max_attempts, 3);
    }

    #[tokio::test]
    async fn test_rejects_bad_recipient() {
        let (service, store) = service();
        let err = service.welcome("not-an-email", "Asha").await.unwrap_err();
        assert!(matches!(err, MailError::Validation(_)));
        assert_eq!(store.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_rejects_nested_payload() {
        let (service, _store) = service();
        let err = service
            .submit(request(json!({
                "type": "generic",
                "to": "a@x.com",
                "subject": "Hi",
                "data": {"items": [1, 2]}
            })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("data.items"));
    }

    #[tokio::test]
    async fn test_otp_requires_code() {
        let (service, _store) = service();
        let err = service.otp("a@x.com", "Asha", " ").await.unwrap_err();
        assert!(matches!(err, MailError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generic_requires_subject_or_template() {
        let (service, _store) = service();
        let err = service
            .submit(request(json!({"type": "newsletter", "to": "a@x.com"})))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejects_template_path() {
        let (service, _store) = service();
        let err = service
            .submit(request(json!({
                "type": "generic",
                "to": "a@x.com",
                "template_name": "../secrets"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Validation(_)));
    }

    #[tokio::test]
    async fn test_profile_reminder_scheduled() {
        let (service, store) = service();
        let at = start() + ChronoDuration::hours(24);
        service
            .profile_reminder("a@x.com", "Asha", Some(at))
            .await
            .unwrap();

        let scheduled = store.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].not_before, Some(at));
        assert_eq!(scheduled[0].kind, EmailKind::ProfileReminder);
    }

    struct DownStore;

    #[async_trait]
    impl QueueStore for DownStore {
        async fn enqueue(&self, _job: &EmailJob) -> MailResult<()> {
            Err(MailError::Internal("connection refused".into()))
        }
        async fn dequeue_due(&self) -> MailResult<Option<EmailJob>> {
            Ok(None)
        }
        async fn dead_letter(&self, _job: &EmailJob) -> MailResult<()> {
            Ok(())
        }
        async fn stats(&self) -> MailResult<QueueStats> {
            Ok(QueueStats::default())
        }
        async fn dead_letters(&self, _limit: usize) -> MailResult<Vec<EmailJob>> {
            Ok(Vec::new())
        }
        async fn health_check(&self) -> MailResult<()> {
            Err(MailError::QueueUnavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_queue_unavailable() {
        let service = EmailService::new(Arc::new(DownStore), Arc::new(ManualClock::new(start())));
        let err = service.welcome("a@x.com", "Asha").await.unwrap_err();
        assert!(matches!(err, MailError::QueueUnavailable(_)));
    }
}
