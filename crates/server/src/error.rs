// crates/server/src/error.rs
use agent_status_core::StatusError;
use agent_status_db::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
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

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::debug!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorResponse::new("Unauthorized")),
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Status(status_err) => match status_err {
                StatusError::Validation { field, message } => {
                    tracing::warn!(field = %field, message = %message, "Rejected status update");
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        ErrorResponse::with_details("Validation error", status_err.to_string()),
                    )
                }
                StatusError::Store { source } => {
                    tracing::error!(error = %source, "Update store error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorResponse::with_details("Update store unavailable", source.to_string()),
                    )
                }
            },
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Database error", db_err.to_string()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Helper to extract status code and body from a response
    async fn extract_response(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        (status, error_response)
    }

    #[tokio::test]
    async fn test_job_not_found_returns_404() {
        let response = ApiError::JobNotFound("J9".to_string()).into_response();
        let (status, body) = extract_response(response).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Job not found");
        assert!(body.details.unwrap().contains("J9"));
    }

    #[tokio::test]
    async fn test_unauthorized_returns_401() {
        let (status, body) = extract_response(ApiError::Unauthorized.into_response()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "Unauthorized");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn test_validation_returns_422() {
        let error: ApiError = StatusError::validation("progress", "must be between 0 and 100").into();
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error, "Validation error");
        assert!(body.details.unwrap().contains("progress"));
    }

    #[tokio::test]
    async fn test_store_error_returns_500() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error: ApiError = StatusError::store(io).into();
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.unwrap().contains("disk gone"));
    }

    #[tokio::test]
    async fn test_bad_request_returns_400() {
        let error = ApiError::BadRequest("limit must be between 1 and 1000".to_string());
        let (status, body) = extract_response(error.into_response()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Bad request");
    }
}
