//! Sink contract and stock sink implementations.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::telemetry::events::LoggedEvent;

/// Terminal consumer of every event that passed severity filtering.
///
/// Implementations wrap analytics SDKs or collectors. Calls arrive on the
/// logger's owner task and must not block.
pub trait EventSink: Send + Sync {
    fn handle_event(&self, event: &LoggedEvent);

    /// One-time initialisation hook, broadcast when the host finishes launching.
    fn app_did_finish_launching(&self) {}
}

impl<F> EventSink for F
where
    F: Fn(&LoggedEvent) + Send + Sync,
{
    fn handle_event(&self, event: &LoggedEvent) {
        self(event)
    }
}

/// Keeps every received event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
    launches: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.name.clone()).collect()
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn handle_event(&self, event: &LoggedEvent) {
        self.events.lock().push(event.clone());
    }

    fn app_did_finish_launching(&self) {
        *self.launches.lock() += 1;
    }
}

/// Forwards events to `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle_event(&self, event: &LoggedEvent) {
        debug!(
            target: "eventlog::sink",
            name = %event.name,
            level = %event.level,
            was_timed = event.was_timed,
            parameters = %serde_json::Value::Object(event.parameters.clone()),
            "event"
        );
    }
}
