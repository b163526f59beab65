//! Error types for the event logging engine.
//!
//! Logging operations themselves never fail from the caller's point of view.
//! These types cover configuration, runtime plumbing, and the upload
//! collaborator boundary.

use thiserror::Error;

/// Errors surfaced by configuration loading and the logger runtime.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),

    #[error("Logger runtime is no longer running")]
    RuntimeClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for LoggerError {
    fn from(err: config::ConfigError) -> Self {
        LoggerError::Config(err.to_string())
    }
}

/// Failure reported by an [`EventUploader`](crate::telemetry::upload::EventUploader).
///
/// Every variant is treated the same way by the pipeline: the batch is
/// requeued at the front of the buffer and retried on the next trigger.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Collector rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Upload timed out")]
    Timeout,
}
