//! Error types for the content cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Content Cache Error Enum ==
/// Unified error type for store operations and the HTTP API.
///
/// A missing record is not an error for `get`; `NotFound` is only produced by
/// operations that address one exact record (`mark_stale`, the raw API).
#[derive(Error, Debug)]
pub enum ContentCacheError {
    /// No record for the addressed key
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Malformed key, payload or request parameter
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Backing storage could not be reached; retry with backoff
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContentCacheError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ContentCacheError::StorageUnavailable(_))
    }
}

// == sqlx Conversion ==
impl From<sqlx::Error> for ContentCacheError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => ContentCacheError::StorageUnavailable(err.to_string()),
            sqlx::Error::Database(db) if db.message().contains("violates") => {
                ContentCacheError::Validation(db.message().to_string())
            }
            other => ContentCacheError::Internal(other.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ContentCacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            ContentCacheError::NotFound(_) => StatusCode::NOT_FOUND,
            ContentCacheError::Validation(_) => StatusCode::BAD_REQUEST,
            ContentCacheError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ContentCacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Generation Error ==
/// Failure reported by (or imposed on) the content-generation collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

// == Result Type Alias ==
/// Convenience Result type for the content cache.
pub type Result<T> = std::result::Result<T, ContentCacheError>;
