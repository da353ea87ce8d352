//! Email queue error types.

use taaza_core::TaazaError;
use thiserror::Error;

/// Result type for email queue operations.
pub type MailResult<T> = Result<T, MailError>;

/// Email queue errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// Submission rejected before it reached the queue.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The queue store could not be reached.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis pool error.
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Recipient exceeded the send rate.
    #[error("Rate limit exceeded for {recipient}")]
    RateLimited { recipient: String },

    /// Template rendering failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Mail transport rejected or failed the send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MailError {
    /// Returns true if the error came from the queue store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            MailError::QueueUnavailable(_) | MailError::Redis(_) | MailError::Pool(_)
        )
    }
}

impl From<MailError> for TaazaError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Validation(msg) => TaazaError::Validation(msg),
            MailError::RateLimited { .. } => TaazaError::RateLimitExceeded,
            MailError::Configuration(msg) => TaazaError::Configuration(msg),
            err if err.is_store_error() => TaazaError::ServiceUnavailable(err.to_string()),
            err => TaazaError::Internal(err.to_string()),
        }
    }
}
