//! Event schema and severity filtering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter set carried by every event and buffered record.
pub type Parameters = serde_json::Map<String, Value>;

/// Severity of a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Verbose internal state reports
    Debug = 1,
    /// Regular events
    Normal = 2,
    /// Something went wrong
    Error = 3,
    /// Something went really wrong
    Alarm = 4,
}

/// Threshold an event level is compared against. `None` observes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug = 1,
    Normal = 2,
    Error = 3,
    Alarm = 4,
    None = 5,
}

impl LogLevel {
    /// True when an event at `level` passes this threshold.
    pub fn includes(self, level: EventLevel) -> bool {
        should_observe(level, self)
    }
}

/// Severity filter: `level >= threshold`, never under `LogLevel::None`.
pub fn should_observe(level: EventLevel, threshold: LogLevel) -> bool {
    match threshold {
        LogLevel::None => false,
        _ => level as u8 >= threshold as u8,
    }
}

impl EventLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Normal => "normal",
            EventLevel::Error => "error",
            EventLevel::Alarm => "alarm",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(EventLevel::Debug),
            "normal" => Ok(EventLevel::Normal),
            "error" => Ok(EventLevel::Error),
            "alarm" => Ok(EventLevel::Alarm),
            other => Err(format!("unknown event level '{}'", other)),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::None),
            other => other.parse::<EventLevel>().map(|level| match level {
                EventLevel::Debug => LogLevel::Debug,
                EventLevel::Normal => LogLevel::Normal,
                EventLevel::Error => LogLevel::Error,
                EventLevel::Alarm => LogLevel::Alarm,
            }),
        }
    }
}

/// A terminal event as seen by downstream sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub name: String,
    pub parameters: Parameters,
    pub level: EventLevel,
    pub was_timed: bool,
    /// Elapsed seconds for completed timed events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl LoggedEvent {
    pub fn instant(name: impl Into<String>, parameters: Parameters, level: EventLevel) -> Self {
        Self {
            name: name.into(),
            parameters,
            level,
            was_timed: false,
            duration: None,
        }
    }

    pub fn timed(
        name: impl Into<String>,
        parameters: Parameters,
        level: EventLevel,
        duration: f64,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            level,
            was_timed: true,
            duration: Some(duration),
        }
    }
}
