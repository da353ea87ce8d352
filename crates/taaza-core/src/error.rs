//! Unified error type for the service layers.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Taaza services.
///
/// Each variant maps onto an HTTP status and a machine-readable code so the
/// REST layer can render any failure without knowing where it came from.
#[derive(Error, Debug)]
pub enum TaazaError {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A backing service (queue store, mail relay) cannot be reached.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaazaError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::RateLimitExceeded => 429,
            Self::ServiceUnavailable(_) => 503,
            Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-level validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `TaazaError`.
    #[must_use]
    pub fn from_error(error: &TaazaError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    /// Sets field-level validation errors.
    #[must_use]
    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&TaazaError> for ErrorResponse {
    fn from(error: &TaazaError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(TaazaError::validation("invalid email").status_code(), 400);
        assert_eq!(
            TaazaError::ServiceUnavailable("redis down".into()).status_code(),
            503
        );
        assert_eq!(TaazaError::RateLimitExceeded.status_code(), 429);
        assert_eq!(TaazaError::Internal("oops".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TaazaError::validation("bad input").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            TaazaError::ServiceUnavailable("queue".into()).error_code(),
            "SERVICE_UNAVAILABLE"
        );
        assert_eq!(
            TaazaError::Configuration("no smtp host".into()).error_code(),
            "CONFIGURATION_ERROR"
        );
    }

    #[test]
    fn test_error_response_from_error() {
        let response = ErrorResponse::from_error(&TaazaError::validation("missing otp"));
        assert_eq!(response.code, "VALIDATION_ERROR");
        assert!(response.message.contains("missing otp"));
        assert!(response.details.is_none());
    }

    #[test]
    fn test_error_response_skips_empty_details() {
        let response = ErrorResponse::from_error(&TaazaError::Internal("boom".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("details").is_none());
    }
}
