//! Recipient address.

use std::fmt;
use thiserror::Error;
use validator::ValidateEmail;

/// Rejected recipient address.
#[derive(Debug, Error)]
#[error("Invalid email address: {0}")]
pub struct EmailError(String);

/// A syntactically valid recipient, trimmed and lowercased so that the same
/// mailbox always maps to the same rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    /// Normalize and check `raw`.
    pub fn new(raw: &str) -> Result<Self, EmailError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.validate_email() {
            Ok(Self(normalized))
        } else {
            Err(EmailError(raw.trim().to_string()))
        }
    }

    /// The normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let email = Email::new("  Customer@Taaza.IN  ").unwrap();
        assert_eq!(email.as_str(), "customer@taaza.in");
        assert_eq!(email.to_string(), "customer@taaza.in");
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for raw in ["invalid", "@example.com", "test@", "", "   "] {
            assert!(Email::new(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn test_error_keeps_the_input() {
        let err = Email::new(" Not An Email ").unwrap_err();
        assert_eq!(err.to_string(), "Invalid email address: Not An Email");
    }
}
