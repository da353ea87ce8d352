//! API response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use taaza_core::{ErrorResponse, TaazaError};
use taaza_mail::{JobId, MailError};
use tracing::error;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// Creates an error response.
    #[must_use]
    pub fn error(error: ErrorResponse) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Application error type for Axum.
#[derive(Debug)]
pub struct AppError(pub TaazaError);

impl From<TaazaError> for AppError {
    fn from(err: TaazaError) -> Self {
        Self(err)
    }
}

impl From<MailError> for AppError {
    fn from(err: MailError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self.0, code = self.0.error_code(), "Request failed");
        }

        let error_response = ErrorResponse::from_error(&self.0);
        let body = Json(ApiResponse::error(error_response));

        (status, body).into_response()
    }
}

/// Result type for Axum handlers.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Helper to create a success response.
#[allow(clippy::unnecessary_wraps)]
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Body of a 202 response for a queued email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub message: String,
    pub job_id: JobId,
}

/// Helper to create an accepted (202) response for a queued job.
pub fn accepted(message: &str, job_id: JobId) -> (StatusCode, Json<QueuedResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            message: message.to_string(),
            job_id,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let body = ApiResponse::error(ErrorResponse::from_error(&TaazaError::validation("bad")));
        let value = serde_json::to_value(body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "VALIDATION_ERROR");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_queue_unavailable_maps_to_503() {
        let response = AppError::from(MailError::QueueUnavailable("down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_mail_validation_maps_to_400() {
        let response = AppError::from(MailError::Validation("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
