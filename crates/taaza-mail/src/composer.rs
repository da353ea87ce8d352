//! Turns a job into a subject and body.

use crate::error::MailResult;
use crate::job::EmailJob;
use crate::template::TemplateRenderer;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;

/// Subject used when neither the job nor its kind supplies one.
const FALLBACK_SUBJECT: &str = "Message from Taaza";

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedEmail {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub body: String,
}

/// Resolves subject and template from the job kind and renders the body.
pub struct MessageComposer {
    renderer: Arc<dyn TemplateRenderer>,
    app_url: String,
}

impl MessageComposer {
    /// Create a composer. `app_url` is exposed to templates as `app_url`.
    pub fn new(renderer: Arc<dyn TemplateRenderer>, app_url: impl Into<String>) -> Self {
        Self {
            renderer,
            app_url: app_url.into(),
        }
    }

    /// Compose `job`. Render failures are returned as errors.
    pub fn compose(&self, job: &EmailJob) -> MailResult<ComposedEmail> {
        let subject = if job.subject.is_empty() {
            job.kind.default_subject().unwrap_or(FALLBACK_SUBJECT).to_string()
        } else {
            job.subject.clone()
        };

        let template = if job.template.is_empty() {
            job.kind.default_template()
        } else {
            Some(job.template.as_str())
        };

        let body = match template {
            Some(name) => self.renderer.render(name, &self.template_data(job))?,
            None => raw_body(job),
        };

        Ok(ComposedEmail { subject, body })
    }

    /// Payload plus `email`, `app_url`, and `profile_url`. Payload keys win.
    pub fn template_data(&self, job: &EmailJob) -> Value {
        let mut data = serde_json::Map::new();
        data.insert("email".to_string(), Value::String(job.recipient.clone()));
        data.insert("app_url".to_string(), Value::String(self.app_url.clone()));
        data.insert(
            "profile_url".to_string(),
            Value::String(format!("{}/profile/complete", self.app_url.trim_end_matches('/'))),
        );
        for (key, value) in &job.payload {
            data.insert(key.clone(), value.clone());
        }
        Value::Object(data)
    }
}

/// Body for template-less jobs: the `body` string, or one `key: value` line per entry.
fn raw_body(job: &EmailJob) -> String {
    if let Some(Value::String(body)) = job.payload.get("body") {
        return body.clone();
    }

    let mut body = String::new();
    for (key, value) in &job.payload {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = writeln!(body, "{key}: {value}");
    }
    body
}
