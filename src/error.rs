//! Error types for the Tollgate service.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TollgateError {
    fn from(e: ::config::ConfigError) -> Self {
        TollgateError::Config(e.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;

/// Failure inside an admitted request handler.
///
/// Reported to the client as `500 Internal Server Error` with the error
/// message as a plain-text body.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The request body could not be read
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// The request body was not valid JSON, or the response failed to encode
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request handler failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self),
        )
            .into_response()
    }
}
