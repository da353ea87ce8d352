//! Job envelope: one requested email send and its retry state.

use crate::error::MailResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Template data attached to a job. Values are JSON scalars.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Default delivery attempts before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new time-ordered job ID.
    pub fn new() -> Self {
        Self(format!("email_{}", Uuid::now_v7().simple()))
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of email a job sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    /// One-time password.
    Otp,
    /// Welcome after signup.
    Welcome,
    /// Nudge to finish the customer profile.
    ProfileReminder,
    /// Caller-provided subject and content.
    #[default]
    #[serde(other)]
    Generic,
}

impl EmailKind {
    /// Subject used when the job carries none.
    pub fn default_subject(self) -> Option<&'static str> {
        match self {
            EmailKind::Otp => Some("Your OTP Code - Taaza"),
            EmailKind::Welcome => Some("Welcome to Taaza! 🎉"),
            EmailKind::ProfileReminder => Some("Complete Your Taaza Profile"),
            EmailKind::Generic => None,
        }
    }

    /// Template used when the job names none.
    pub fn default_template(self) -> Option<&'static str> {
        match self {
            EmailKind::Otp => Some("otp"),
            EmailKind::Welcome => Some("welcome"),
            EmailKind::ProfileReminder => Some("profile-reminder"),
            EmailKind::Generic => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            EmailKind::Otp => "otp",
            EmailKind::Welcome => "welcome",
            EmailKind::ProfileReminder => "profile_reminder",
            EmailKind::Generic => "generic",
        }
    }
}

impl fmt::Display for EmailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued email send.
///
/// A job lives in exactly one place at a time: the immediate queue, the
/// scheduled set, the dead-letter list, or a worker. `attempt_count` never
/// exceeds `max_attempts`, and `not_before` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    /// Job ID.
    pub id: JobId,

    /// Email kind.
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: EmailKind,

    /// Destination address.
    #[serde(rename = "to", alias = "recipient")]
    pub recipient: String,

    /// Subject line. Empty means the kind's default.
    #[serde(default)]
    pub subject: String,

    /// Template name. Empty means the kind's default, or a raw body for generic jobs.
    #[serde(rename = "template_name", alias = "template", default)]
    pub template: String,

    /// Template data.
    #[serde(rename = "data", alias = "payload", default)]
    pub payload: Payload,

    /// Failed attempts so far.
    #[serde(rename = "attempts", alias = "attempt_count", default)]
    pub attempt_count: u32,

    /// Attempts allowed before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Earliest time the job may run.
    #[serde(
        rename = "scheduled_at",
        alias = "not_before",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_before: Option<DateTime<Utc>>,

    /// Most recent failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl EmailJob {
    /// Creates a job with a fresh ID, zero attempts, and no schedule.
    pub fn new(kind: EmailKind, recipient: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            kind,
            recipient: recipient.into(),
            subject: String::new(),
            template: String::new(),
            payload: Payload::new(),
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at,
            not_before: None,
            last_error: None,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the template name.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Sets the template data.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets the attempt ceiling. Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Schedules the job for later.
    #[must_use]
    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    /// Returns true once no attempts remain.
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Returns true if the job may run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> MailResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> MailResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
