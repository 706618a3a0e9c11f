//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent, or present but expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Rejected argument (non-positive threshold, bad key, invalid config)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Structural entry violations found by validation
    #[error("Cache corruption detected: {0}")]
    Corruption(String),

    /// Cache directory or file not accessible
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation not allowed in the current mode
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Offline-only read path used while online
    #[error("Offline mode is not enabled: {0}")]
    NotOffline(String),

    /// Size or entry ceiling breached
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Long-running operation aborted through its cancellation flag
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    // == Context Wrapping ==
    /// Wraps an I/O error with the operation it came from.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                CacheError::PermissionDenied(format!("{}: {}", context, err))
            }
            _ => CacheError::Io(format!("{}: {}", context, err)),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::io("io", err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::BAD_REQUEST,
            CacheError::InvalidState(_) | CacheError::NotOffline(_) => StatusCode::CONFLICT,
            CacheError::LimitExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            CacheError::Corruption(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Io(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
