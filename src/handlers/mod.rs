pub mod auth;
pub mod leases;
pub mod listings;
pub mod payments;
pub mod persons;
pub mod profile;
pub mod rental_requests;

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use validator::ValidationErrors;

use crate::rules::RuleViolation;
use crate::services::AccessDenied;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error response: `{"error": "message"}`, plus per-field messages on validation failures
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            errors: None,
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    errors: Option<FieldErrors>,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            errors: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn validation(errors: FieldErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "validation failed".to_string(),
            errors: Some(errors),
        }
    }

    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                errors: self.errors,
            }),
        )
            .into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errs: ValidationErrors) -> Self {
        let mut errors = FieldErrors::new();
        for (field, list) in errs.field_errors() {
            let messages = list
                .iter()
                .map(|e| match &e.message {
                    Some(m) => m.to_string(),
                    None => e.code.to_string(),
                })
                .collect();
            errors.insert(field.to_string(), messages);
        }
        Self::validation(errors)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(errs) = err.downcast_ref::<ValidationErrors>() {
            return errs.clone().into();
        }
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::new(StatusCode::NOT_FOUND, nf.to_string());
        }
        if let Some(violation) = err.downcast_ref::<RuleViolation>() {
            return match violation {
                RuleViolation::ReasonRequired { field, message } => Self::field(field, message),
                other => Self::bad_request(other.to_string()),
            };
        }
        if let Some(denied) = err.downcast_ref::<AccessDenied>() {
            return Self::forbidden(denied.to_string());
        }
        if let Some(sqlx::Error::Database(db)) = err.downcast_ref::<sqlx::Error>() {
            if db.is_unique_violation() {
                tracing::debug!("Unique constraint hit: {}", db);
                return Self::bad_request("conflicting update");
            }
        }
        tracing::error!("Request failed: {:#}", err);
        Self::internal("internal server error")
    }
}

/// Message response for simple status messages
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { message: msg.into() })
    }
}

/// Count response for the `/count` endpoints
#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// JSON body that may be left out. An empty body yields `T::default()`; a
/// body that is present has to parse, otherwise the request fails with 400.
pub struct OptionalJson<T>(pub T);

#[async_trait::async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }
        serde_json::from_slice(&bytes)
            .map(Self)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))
    }
}

/// `?status=` filter shared by list endpoints
#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    pub status: Option<S>,
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Healthcheck endpoint, returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "rental-hub",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NotFoundError;

    #[test]
    fn test_rule_violation_is_bad_request() {
        let err: ApiError = anyhow::Error::from(RuleViolation::AlreadyPaid).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "this month is already paid");
        assert!(err.errors.is_none());
    }

    #[test]
    fn test_reason_required_is_field_error() {
        let violation = RuleViolation::ReasonRequired {
            field: "reason",
            message: "rejection reason is required",
        };
        let err: ApiError = anyhow::Error::from(violation).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let errors = err.errors.unwrap();
        assert_eq!(errors["reason"], vec!["rejection reason is required".to_string()]);
    }

    #[test]
    fn test_not_found_and_forbidden() {
        let err: ApiError = anyhow::Error::from(NotFoundError::new("Lease", "9")).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err: ApiError = anyhow::Error::from(AccessDenied("nope")).into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_context_keeps_typed_error() {
        use anyhow::Context;
        let res: anyhow::Result<()> = Err(RuleViolation::NotPdf.into());
        let err: ApiError = res.context("uploading").unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[derive(Debug, Default, Deserialize)]
    struct Note {
        text: Option<String>,
    }

    async fn extract(body: &'static str) -> Result<Note, ApiError> {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(axum::body::Body::from(body))
            .unwrap();
        OptionalJson::<Note>::from_request(req, &()).await.map(|OptionalJson(note)| note)
    }

    #[tokio::test]
    async fn test_optional_json_body() {
        assert!(extract("").await.unwrap().text.is_none());
        assert_eq!(extract(r#"{"text": "hi"}"#).await.unwrap().text.as_deref(), Some("hi"));

        let err = extract(r#"{"text": 5}"#).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("invalid request body"));
        assert_eq!(extract("not json").await.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_error_is_internal() {
        let err: ApiError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal server error");
    }
}
