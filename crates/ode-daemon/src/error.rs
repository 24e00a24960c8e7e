//! Error types for oded

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ode_feed::FeedError;
use ode_ledger::StorageError;
use ode_runner::{ProducerError, RunnerError};
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

    /// Ledger storage error
    #[error("Ledger error: {0}")]
    Ledger(#[from] StorageError),

    /// Runner could not be built
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    /// Producer could not be built
    #[error("Producer error: {0}")]
    Producer(#[from] ProducerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Ledger could not be read
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Feed registration failed
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Runner is not running in this process
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Feed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FEED_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        tracing::warn!(code, error = %self, "API request failed");

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
