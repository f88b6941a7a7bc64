//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, and the mapping
//! from port errors to HTTP status codes used by the handlers.

use crate::config::ConfigError;
use axum::http::StatusCode;
use progress_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The error half of every handler's return type.
pub type HandlerError = (StatusCode, String);

/// Maps a port error to a status code and a message that is safe to show.
pub fn port_rejection(err: &PortError) -> HandlerError {
    match err {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what.clone()),
        PortError::Conflict(what) => (StatusCode::CONFLICT, what.clone()),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::QuotaExceeded(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "You have exceeded the API quota. Please check your plan and billing details.".to_string(),
        ),
        PortError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "The service is currently busy. Please try again in a moment.".to_string(),
        ),
        PortError::Unexpected(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An unexpected error occurred".to_string(),
        ),
    }
}

/// User-facing text for a failed speech synthesis.
pub fn audio_failure_message(err: &PortError) -> &'static str {
    match err {
        PortError::QuotaExceeded(_) => {
            "You have exceeded the API quota for audio generation. Please check your plan and billing details."
        }
        PortError::Unavailable(_) => "The audio service is currently busy. Please try again in a moment.",
        _ => "Failed to generate audio. Please try again.",
    }
}
