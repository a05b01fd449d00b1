//! Error types for deepseek-proxy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::proxy::types::ErrorResponse;

/// Result type alias for deepseek-proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deepseek-proxy.
///
/// Each variant maps to exactly one HTTP status; see [`Error::status_code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("DeepSeek API error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream request timed out after {0}s")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Configuration(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { .. }
            | Error::Transport(_)
            | Error::Timeout(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short category string carried in the `error` field of the response body.
    pub fn category(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "Invalid request"
        } else {
            "Server error"
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.category().to_string(),
            details: Some(self.to_string()),
        };

        (status, Json(body)).into_response()
    }
}
