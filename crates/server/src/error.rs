// crates/server/src/error.rs
//! Service error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use zixue_core::CollabError;
use zixue_db::DbError;
use zixue_queue::QueueError;

/// Structured JSON error body.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Semantic error kinds surfaced by the services.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("no questions available - all fallback mechanisms exhausted")]
    NoQuestions,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("downstream unreachable: {0}")]
    Connectivity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Connectivity(msg) => ApiError::Connectivity(msg),
            DbError::Timeout(msg) => ApiError::Timeout(msg),
            DbError::Constraint(msg) => ApiError::Conflict(msg),
            DbError::Query(msg) | DbError::Decode(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Shutdown => ApiError::Connectivity("generator queue shut down".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CollabError> for ApiError {
    fn from(e: CollabError) -> Self {
        match e {
            CollabError::Unreachable(msg) => ApiError::Connectivity(msg),
            CollabError::Rejected(msg) => ApiError::Unprocessable(msg),
            CollabError::NoEntry(c) => ApiError::Validation(format!("no dictionary entry for '{c}'")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => {
                tracing::warn!(message = %msg, "validation failure");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Auth(msg) => {
                tracing::warn!(message = %msg, "auth failure");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("Unauthorized"),
                )
            }
            ApiError::NotFound(msg) => {
                tracing::warn!(message = %msg, "not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Not found", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
            ApiError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse::with_details("Payload too large", msg.clone()),
            ),
            ApiError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::with_details("Unprocessable request", msg.clone()),
            ),
            ApiError::NoQuestions => {
                tracing::error!("selection engine exhausted all fallbacks");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(self.to_string()),
                )
            }
            ApiError::Timeout(msg) => {
                tracing::error!(message = %msg, "timeout");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    ErrorResponse::with_details("Timed out", msg.clone()),
                )
            }
            ApiError::Connectivity(msg) => {
                tracing::error!(message = %msg, "downstream unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::with_details("Downstream unreachable", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal error");
                // Internal detail stays out of the response body.
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_validation_maps_to_400() {
        let (status, body) = extract(
            ApiError::Validation("qCount must be between 1 and 20".into()).into_response(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.details.unwrap().contains("qCount"));
    }

    #[tokio::test]
    async fn test_no_questions_maps_to_500_with_message() {
        let (status, body) = extract(ApiError::NoQuestions.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.contains("fallback mechanisms exhausted"));
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let (status, body) =
            extract(ApiError::Internal("secret stack trace".into()).into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_db_error_conversion() {
        assert!(matches!(
            ApiError::from(DbError::Constraint("dup".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(DbError::Timeout("slow".into())),
            ApiError::Timeout(_)
        ));
        assert!(matches!(
            ApiError::from(DbError::Connectivity("down".into())),
            ApiError::Connectivity(_)
        ));
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ApiError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ApiError::PayloadTooLarge("x".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::Unprocessable("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                ApiError::Connectivity("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            let (status, _) = extract(error.into_response()).await;
            assert_eq!(status, expected);
        }
    }
}
