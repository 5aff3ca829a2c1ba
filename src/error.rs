//! Error types for the cache and query layers
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
/// Errors raised by the cache subsystem and its backend.
///
/// These never escape a query execution: the executor treats every cache
/// failure as a miss or a skipped write.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key/value backend failed a read, write or delete
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored envelope or value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            CacheError::Backend(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            CacheError::Serialization(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            CacheError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Query Error Enum ==
/// Classified failures surfaced by [`crate::query::QueryExecutor`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A security heuristic matched the query text or a parameter
    #[error("Query rejected by security rule '{rule}'")]
    Validation { rule: String },

    /// A maintenance template argument was outside its allow-list or bounds
    #[error("Invalid maintenance template: {0}")]
    InvalidTemplate(String),

    /// Execution exceeded its time bound
    #[error("Query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The engine reported an error that retrying cannot fix
    #[error("Non-retryable query error: {message}")]
    NonRetryable { message: String },

    /// The engine kept failing with a retryable error
    #[error("Query failed after {attempts} attempt(s): {message}")]
    Execution { attempts: u32, message: String },
}

impl QueryError {
    /// Returns true if a later retry of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Timeout { .. } | QueryError::Execution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(QueryError::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(QueryError::Execution {
            attempts: 2,
            message: "connection reset".to_string()
        }
        .is_retryable());
        assert!(!QueryError::NonRetryable {
            message: "duplicate key".to_string()
        }
        .is_retryable());
        assert!(!QueryError::Validation {
            rule: "union_select".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_backend_error_maps_to_unavailable() {
        let response = CacheError::Backend("down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_serde_failure_converts_to_serialization() {
        let err: CacheError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_request_maps_to_bad_request() {
        let response = CacheError::InvalidRequest("no tags".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
