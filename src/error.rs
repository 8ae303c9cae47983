//! Error taxonomy for the scripture service.
//!
//! All fallible core operations return [`Result`]. The variants map onto
//! the HTTP contract in [`crate::server`]:
//!
//! | Variant | Status | Meaning |
//! |---------|--------|---------|
//! | `Validation` | 400 | missing or malformed caller input |
//! | `Forbidden` | 403 | capability check failed |
//! | `NotFound` | 404 | unknown version |
//! | `Upstream` | 500 | embedding service unreachable or misbehaving |
//! | `Retrieval` | 500 | corpus query failed |
//! | `DimensionMismatch` | 500 | stored embedding bytes disagree with the configured dimension |
//! | `DeadlineExceeded` | 500 | stream deadline expired before the response began |
//! | `Db` | 500 | any other database error |
//!
//! A disconnected caller is not an error: stream producers observe the
//! closed channel and stop silently.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The main error type for scripture service operations.
#[derive(Error, Debug)]
pub enum ScriptoriumError {
    /// Missing or malformed caller input.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Capability check failed for a non-public version.
    #[error("forbidden: access denied for version {0}")]
    Forbidden(String),

    /// Unknown version.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding service failed or could not be reached.
    #[error("embedding service error: {0}")]
    Upstream(String),

    /// One of the corpus queries failed.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// A stored embedding does not have the corpus-wide dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The streaming deadline expired.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Database error outside the retrieval path.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Result type alias for operations that may fail with [`ScriptoriumError`].
pub type Result<T> = std::result::Result<T, ScriptoriumError>;

impl ScriptoriumError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ScriptoriumError::Validation(msg.into())
    }

    pub fn forbidden<S: Into<String>>(version_code: S) -> Self {
        ScriptoriumError::Forbidden(version_code.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ScriptoriumError::NotFound(msg.into())
    }

    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        ScriptoriumError::Upstream(msg.into())
    }

    pub fn retrieval<S: Into<String>>(msg: S) -> Self {
        ScriptoriumError::Retrieval(msg.into())
    }

    /// Machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ScriptoriumError::Validation(_) => "bad_request",
            ScriptoriumError::Forbidden(_) => "forbidden",
            ScriptoriumError::NotFound(_) => "not_found",
            ScriptoriumError::Upstream(_) => "upstream_error",
            ScriptoriumError::Retrieval(_) => "retrieval_error",
            ScriptoriumError::DimensionMismatch { .. } => "dimension_mismatch",
            ScriptoriumError::DeadlineExceeded => "deadline_exceeded",
            ScriptoriumError::Db(_) => "internal",
        }
    }
}

impl IntoResponse for ScriptoriumError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ScriptoriumError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ScriptoriumError::Forbidden(code) => (
                StatusCode::FORBIDDEN,
                format!("access denied for version {}", code),
            ),
            ScriptoriumError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ScriptoriumError::Upstream(e) => {
                tracing::error!(error = %e, "embedding service failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to process search query".to_string(),
                )
            }
            ScriptoriumError::Retrieval(e) => {
                tracing::error!(error = %e, "retrieval failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to retrieve search results".to_string(),
                )
            }
            ScriptoriumError::DimensionMismatch { expected, actual } => {
                tracing::error!(expected, actual, "embedding dimension mismatch");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "corpus vector data is corrupt".to_string(),
                )
            }
            ScriptoriumError::DeadlineExceeded => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "operation deadline exceeded".to_string(),
            ),
            ScriptoriumError::Db(e) => {
                tracing::error!(error = %e, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": { "code": self.code(), "message": message }
        }));

        (status, body).into_response()
    }
}
