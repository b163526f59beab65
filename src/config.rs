//! Configuration System
//!
//! Typed configuration for the event logger. Values are layered by
//! [`ConfigLoader`]: built-in defaults, the user's global config file, an
//! explicit file, then `EVENTLOG__*` environment variables.

use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::telemetry::events::{LogLevel, Parameters};
use crate::telemetry::sessions::TimedEventRestartPolicy;
use crate::telemetry::upload::BufferConfig;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Events below this threshold never reach sinks or the buffer
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Echo events to the console target
    #[serde(default = "default_true")]
    pub console_log_enabled: bool,

    /// Use `console_log_level` instead of `log_level` for console echo
    #[serde(default)]
    pub use_alternate_console_level: bool,

    #[serde(default = "default_console_log_level")]
    pub console_log_level: LogLevel,

    #[serde(default = "default_console_log_prefix")]
    pub console_log_prefix: String,

    /// Trace the logger's own session and sync decisions
    #[serde(default)]
    pub verbose_console_logging: bool,

    #[serde(default)]
    pub start_session_event_name: Option<String>,

    #[serde(default)]
    pub end_session_event_name: Option<String>,

    /// Parameters attached to session start and end events
    #[serde(default)]
    pub session_event_super_parameters: Parameters,

    /// Parameter receiving the elapsed seconds of a timed event (empty disables)
    #[serde(default = "default_duration_key")]
    pub timed_event_duration_key: Option<String>,

    /// Parameter receiving the free-form text of `log_text`
    #[serde(default = "default_text_key")]
    pub text_parameter_key: String,

    /// Restart force-closed timed events in the new session on identity change
    #[serde(default)]
    pub restart_timed_events_on_identity_change: bool,

    #[serde(default)]
    pub buffer: BufferConfig,

    /// Host process logging (used by the binary)
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_log_level() -> LogLevel {
    LogLevel::Normal
}

fn default_console_log_level() -> LogLevel {
    LogLevel::Debug
}

fn default_true() -> bool {
    true
}

fn default_console_log_prefix() -> String {
    "[[eventlog]] ".to_string()
}

fn default_duration_key() -> Option<String> {
    Some("duration".to_string())
}

fn default_text_key() -> String {
    "text".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            console_log_enabled: default_true(),
            use_alternate_console_level: false,
            console_log_level: default_console_log_level(),
            console_log_prefix: default_console_log_prefix(),
            verbose_console_logging: false,
            start_session_event_name: None,
            end_session_event_name: None,
            session_event_super_parameters: Parameters::new(),
            timed_event_duration_key: default_duration_key(),
            text_parameter_key: default_text_key(),
            restart_timed_events_on_identity_change: false,
            buffer: BufferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Buffer(String),
    Session(String),
    Parameters(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Buffer(msg) => write!(f, "Buffer: {}", msg),
            ValidationError::Session(msg) => write!(f, "Session: {}", msg),
            ValidationError::Parameters(msg) => write!(f, "Parameters: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LoggerConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.buffer.validate() {
            errors.push(ValidationError::Buffer(e));
        }

        for (label, name) in [
            ("start_session_event_name", &self.start_session_event_name),
            ("end_session_event_name", &self.end_session_event_name),
        ] {
            if matches!(name.as_deref(), Some("")) {
                errors.push(ValidationError::Session(format!("{} cannot be empty", label)));
            }
        }

        if self.text_parameter_key.is_empty() {
            errors.push(ValidationError::Parameters(
                "text_parameter_key cannot be empty".to_string(),
            ));
        }

        if let Some(key) = self.duration_key() {
            if self.buffer.reserved_keys().contains(&key) {
                errors.push(ValidationError::Parameters(format!(
                    "timed_event_duration_key '{}' collides with a reserved buffer key",
                    key
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Duration parameter key, if enabled.
    pub fn duration_key(&self) -> Option<&str> {
        self.timed_event_duration_key
            .as_deref()
            .filter(|k| !k.is_empty())
    }

    /// Threshold used for console echo.
    pub fn console_threshold(&self) -> LogLevel {
        if self.use_alternate_console_level {
            self.console_log_level
        } else {
            self.log_level
        }
    }

    pub fn restart_policy(&self) -> TimedEventRestartPolicy {
        TimedEventRestartPolicy::from_flag(self.restart_timed_events_on_identity_change)
    }
}
