//! Error types for csr-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use csr_checkpoints::CheckpointError;
use csr_store::StorageError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Delivery gateway setup error
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or malformed caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict with the current resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<CheckpointError> for ApiError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::NotFound(m) => ApiError::NotFound(m),
            CheckpointError::Forbidden(m) => ApiError::Forbidden(m),
            CheckpointError::InvalidTransition(m) => ApiError::Conflict(m),
            CheckpointError::Validation(m) => ApiError::Validation(m),
            CheckpointError::Storage(e) => ApiError::Storage(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(StorageError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: CheckpointError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn test_checkpoint_error_status_codes() {
        assert_eq!(
            status_of(CheckpointError::NotFound("Program not found".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CheckpointError::Forbidden("nope".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CheckpointError::InvalidTransition(
                "Checkpoint 1 must be completed first".into()
            )),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckpointError::Validation("bad number".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CheckpointError::Storage(StorageError::Connection("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::BadRequest("test".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("test".to_string()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Storage(StorageError::Conflict("dup".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }
}
