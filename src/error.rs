//! Core error taxonomy.
//!
//! Every subsystem maps its failures into `CoreError`; only the outermost
//! boundaries (request handlers, worker job loop) convert errors into wire
//! messages or task failure records.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed request parameter.
    #[error("{0}")]
    BadRequest(String),
    /// Run, task, or source table absent.
    #[error("{0}")]
    NotFound(String),
    /// Caller lacks the role or does not own the run's stage slot.
    #[error("{0}")]
    Unauthorized(String),
    /// Task not in a runnable state, or stage slot already taken.
    #[error("{0}")]
    Conflict(String),
    /// Database failure.
    #[error("database error: {0}")]
    Storage(#[from] diesel::result::Error),
    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(String),
}

impl CoreError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handlers catch at the outermost boundary, log, and return `{error: message}`.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CoreError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            CoreError::unauthorized("x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(CoreError::conflict("x").status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_message_passthrough() {
        let err = CoreError::conflict("Task already running");
        assert_eq!(err.to_string(), "Task already running");
    }
}
