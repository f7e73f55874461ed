//! API error types and conversions

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::storage::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Malformed metric, unknown kind or kind conflict
    InvalidRequest(String),

    /// Metric not found
    NotFound(String),

    /// The server is shutting down
    Unavailable(String),

    /// Storage operation failed
    StorageError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::StorageError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::InvalidValue(_)
            | StorageError::InvalidType(_)
            | StorageError::KindMismatch { .. } => {
                warn!("rejected metric: {}", err);
                ApiError::InvalidRequest(err.to_string())
            }
            StorageError::Cancelled => ApiError::Unavailable(err.to_string()),
            _ => {
                error!("storage failure: {}", err);
                ApiError::StorageError(err.to_string())
            }
        }
    }
}
