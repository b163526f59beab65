//! Session policy: lifecycle state and identity-change handling.

use serde::{Deserialize, Serialize};

/// Observable lifecycle state of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Created,
    Active,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::NoSession => "no_session",
            SessionState::Created => "created",
            SessionState::Active => "active",
        }
    }
}

/// What happens to open timed events when the owning identity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedEventRestartPolicy {
    /// Close them with the old session and forget them.
    #[default]
    CloseOnly,
    /// Close them with the old session, then start them again in the new one.
    RestartInNewSession,
}

impl TimedEventRestartPolicy {
    pub fn from_flag(restart: bool) -> Self {
        if restart {
            TimedEventRestartPolicy::RestartInNewSession
        } else {
            TimedEventRestartPolicy::CloseOnly
        }
    }
}
