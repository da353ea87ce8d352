//! Validated JSON extractor for automatic request validation.
//!
//! `ValidatedJson<T>` deserializes a JSON body and validates it with the
//! `validator` crate. A body that cannot be parsed is rejected with 422
//! Unprocessable Entity; a parsed body that fails validation is rejected
//! with 400 Bad Request and field-level details. Both use the standard
//! error envelope.

use crate::responses::ApiResponse;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use taaza_core::{field_errors, ErrorResponse};
use validator::{Validate, ValidationErrors};

/// JSON extractor that validates the deserialized value.
///
/// # Example
///
/// ```ignore
/// use taaza_rest::extractors::ValidatedJson;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct WelcomeRequest {
///     #[validate(email)]
///     email: String,
/// }
///
/// async fn welcome(ValidatedJson(request): ValidatedJson<WelcomeRequest>) {
///     // request is guaranteed to be valid here
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection type for validated JSON extraction.
#[derive(Debug)]
pub enum ValidatedJsonRejection {
    /// JSON parsing/deserialization error.
    JsonError(JsonRejection),
    /// Validation error with field-level details.
    ValidationError(ValidationErrors),
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        match self {
            Self::JsonError(rejection) => {
                let error_response = ErrorResponse {
                    code: "INVALID_JSON".to_string(),
                    message: format!("Invalid JSON: {}", rejection.body_text()),
                    details: None,
                };
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ApiResponse::error(error_response)),
                )
                    .into_response()
            }
            Self::ValidationError(errors) => {
                let error_response = ErrorResponse {
                    code: "VALIDATION_ERROR".to_string(),
                    message: "Request validation failed".to_string(),
                    details: Some(field_errors(&errors)),
                };
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(error_response)),
                )
                    .into_response()
            }
        }
    }
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct TestRequest {
        #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
        name: String,
        #[validate(email(message = "Invalid email format"))]
        email: String,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_extracts() {
        let req = json_request(r#"{"name": "Asha", "email": "asha@taaza.in"}"#);
        let ValidatedJson(body) = ValidatedJson::<TestRequest>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(body.name, "Asha");
    }

    #[tokio::test]
    async fn test_invalid_field_is_bad_request() {
        let req = json_request(r#"{"name": "As", "email": "asha@taaza.in"}"#);
        let rejection = ValidatedJson::<TestRequest>::from_request(req, &())
            .await
            .unwrap_err();
        assert!(matches!(rejection, ValidatedJsonRejection::ValidationError(_)));
        assert_eq!(rejection.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        let req = json_request(r#"{"name": "#);
        let rejection = ValidatedJson::<TestRequest>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(
            rejection.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
