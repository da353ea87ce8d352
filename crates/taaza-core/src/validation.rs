//! Validation utilities.

use crate::FieldError;
use validator::ValidationErrors;

/// Flattens `validator::ValidationErrors` into field errors.
#[must_use]
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut field_errors: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldError {
                field: (*field).to_string(),
                message: error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), ToString::to_string),
                code: error.code.to_string(),
            })
        })
        .collect();

    // HashMap iteration order is unspecified.
    field_errors.sort_by(|a, b| a.field.cmp(&b.field));
    field_errors
}

/// Common validation functions.
pub mod rules {
    use validator::ValidationError;

    /// Validates that a string is not blank (not empty after trimming).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("not_blank"));
        }
        Ok(())
    }

    /// Validates a template name: a plain file stem, no path separators.
    pub fn template_name(value: &str) -> Result<(), ValidationError> {
        if value.is_empty() {
            return Ok(());
        }
        if value.len() > 64 {
            return Err(ValidationError::new("template_name_too_long"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::new("template_name_invalid_characters"));
        }
        Ok(())
    }
}
