//! Email submission and queue inspection controller.

use crate::{
    extractors::ValidatedJson,
    responses::{accepted, ok, ApiResult, AppError, QueuedResponse},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taaza_core::rules;
use taaza_mail::{EmailJob, EmailKind, Payload, QueueStats, SendEmailRequest, WorkerPoolStats};
use validator::Validate;

const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;
const MAX_DEAD_LETTER_LIMIT: usize = 500;

/// Create the email router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send", post(send_email))
        .route("/otp", post(send_otp))
        .route("/welcome", post(send_welcome))
        .route("/profile-reminder", post(send_profile_reminder))
        .route("/stats", get(queue_stats))
        .route("/dead-letters", get(dead_letters))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Generic email submission.
#[derive(Debug, Deserialize, Validate)]
pub struct SendEmailBody {
    #[serde(rename = "type")]
    pub kind: EmailKind,
    #[validate(email(message = "Invalid email format"))]
    pub to: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

impl From<SendEmailBody> for SendEmailRequest {
    fn from(body: SendEmailBody) -> Self {
        Self {
            kind: body.kind,
            to: body.to,
            subject: body.subject,
            template: body.template_name,
            data: body.data,
            schedule_at: body.schedule_at,
        }
    }
}

/// One-time password email.
#[derive(Debug, Deserialize, Validate)]
pub struct OtpBody {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "rules::not_blank", message = "Name is required"))]
    pub name: String,
    #[validate(custom(function = "rules::not_blank", message = "OTP is required"))]
    pub otp: String,
}

/// Welcome email.
#[derive(Debug, Deserialize, Validate)]
pub struct WelcomeBody {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "rules::not_blank", message = "Name is required"))]
    pub name: String,
}

/// Profile completion reminder. `delay` is the time to send at.
#[derive(Debug, Deserialize, Validate)]
pub struct ProfileReminderBody {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "rules::not_blank", message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub delay: Option<DateTime<Utc>>,
}

/// Query parameters for the dead-letter listing.
#[derive(Debug, Deserialize)]
pub struct DeadLetterParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_DEAD_LETTER_LIMIT
}

/// Queue and worker statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub queue: QueueStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkerPoolStats>,
}

/// Dead-lettered jobs, newest first.
#[derive(Debug, Serialize)]
pub struct DeadLettersResponse {
    pub jobs: Vec<EmailJob>,
    pub count: usize,
    pub limit: usize,
}

type Accepted = Result<(StatusCode, Json<QueuedResponse>), AppError>;

// ============================================================================
// Handlers
// ============================================================================

/// Queue an email of any kind.
pub async fn send_email(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<SendEmailBody>,
) -> Accepted {
    let job_id = state.email_service.submit(body.into()).await?;
    Ok(accepted("Email queued successfully", job_id))
}

/// Queue a one-time password email.
pub async fn send_otp(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<OtpBody>,
) -> Accepted {
    let job_id = state
        .email_service
        .otp(&body.email, &body.name, &body.otp)
        .await?;
    Ok(accepted("OTP email queued successfully", job_id))
}

/// Queue a welcome email.
pub async fn send_welcome(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<WelcomeBody>,
) -> Accepted {
    let job_id = state.email_service.welcome(&body.email, &body.name).await?;
    Ok(accepted("Welcome email queued successfully", job_id))
}

/// Queue a profile completion reminder.
pub async fn send_profile_reminder(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<ProfileReminderBody>,
) -> Accepted {
    let job_id = state
        .email_service
        .profile_reminder(&body.email, &body.name, body.delay)
        .await?;
    Ok(accepted("Profile reminder email queued successfully", job_id))
}

/// Queue sizes plus worker pool counters.
pub async fn queue_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let queue = state.email_service.stats().await?;
    ok(StatsResponse {
        queue,
        workers: state.worker_pool.as_ref().map(|pool| pool.stats()),
    })
}

/// Most recent dead-lettered jobs.
pub async fn dead_letters(
    State(state): State<AppState>,
    Query(params): Query<DeadLetterParams>,
) -> ApiResult<DeadLettersResponse> {
    let limit = params.limit.clamp(1, MAX_DEAD_LETTER_LIMIT);
    let jobs = state.email_service.dead_letters(limit).await?;
    ok(DeadLettersResponse {
        count: jobs.len(),
        jobs,
        limit,
    })
}
