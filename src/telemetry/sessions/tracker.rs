//! Session bookkeeping. Emission of session boundary events lives in the
//! logger; this type only owns the id and the active/backgrounded flags.

use chrono::{DateTime, Utc};

use crate::telemetry::sessions::policy::SessionState;
use crate::telemetry::types::new_session_id;

#[derive(Debug, Default, Clone)]
pub struct SessionTracker {
    session_id: Option<String>,
    active: bool,
    backgrounded: bool,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_backgrounded(&self) -> bool {
        self.backgrounded
    }

    pub fn set_backgrounded(&mut self, backgrounded: bool) {
        self.backgrounded = backgrounded;
    }

    pub fn state(&self) -> SessionState {
        match (&self.session_id, self.active) {
            (None, _) => SessionState::NoSession,
            (Some(_), false) => SessionState::Created,
            (Some(_), true) => SessionState::Active,
        }
    }

    /// Generate a session id if none is present. Returns true when a new id
    /// was created. Does not mark the session active.
    pub fn ensure_exists(&mut self, now: DateTime<Utc>) -> bool {
        if self.session_id.is_some() {
            return false;
        }
        self.session_id = Some(new_session_id(now));
        true
    }

    /// Mark the session active. Returns true on the inactive -> active edge.
    pub fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Clear id and active flag. Returns the id of the session that ended,
    /// if it was active.
    pub fn end(&mut self) -> Option<String> {
        let was_active = std::mem::replace(&mut self.active, false);
        let id = self.session_id.take();
        if was_active {
            id
        } else {
            None
        }
    }
}
