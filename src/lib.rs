//! eventlog: client-side event logging engine
//!
//! Severity filtering, session management, timed events and a buffered
//! batch upload pipeline, feeding a set of pluggable downstream sinks.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod replay;
pub mod telemetry;

pub use config::LoggerConfig;
pub use error::{LoggerError, UploadError};
pub use telemetry::{
    EventLevel, EventLogger, EventSink, EventUploader, LogLevel, LoggedEvent, LoggerHandle,
    LoggerRuntime, Parameters,
};
