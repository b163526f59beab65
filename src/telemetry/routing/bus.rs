//! In-process sink registry for terminal events.
//!
//! Sinks are kept sorted by their registration order value (ties keep
//! registration sequence). Dispatch walks a point-in-time snapshot, so a sink
//! may register or unregister sinks while handling an event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::telemetry::events::LoggedEvent;
use crate::telemetry::routing::sinks::EventSink;

/// Registration ticket. Unregistering a stale handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkHandle(u64);

struct Registered {
    handle: SinkHandle,
    order: i32,
    sink: Arc<dyn EventSink>,
}

#[derive(Clone, Default)]
pub struct SinkRegistry {
    sinks: Arc<RwLock<Vec<Registered>>>,
    next_id: Arc<AtomicU64>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn EventSink>, order: i32) -> SinkHandle {
        let handle = SinkHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut sinks = self.sinks.write();
        sinks.push(Registered {
            handle,
            order,
            sink,
        });
        // stable sort keeps registration sequence for equal orders
        sinks.sort_by_key(|r| r.order);
        handle
    }

    pub fn unregister(&self, handle: SinkHandle) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|r| r.handle != handle);
        sinks.len() != before
    }

    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventSink>> {
        self.sinks.read().iter().map(|r| r.sink.clone()).collect()
    }

    pub fn dispatch(&self, event: &LoggedEvent) {
        for sink in self.snapshot() {
            sink.handle_event(event);
        }
    }

    pub fn app_did_finish_launching(&self) {
        for sink in self.snapshot() {
            sink.app_did_finish_launching();
        }
    }
}
