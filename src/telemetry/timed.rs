//! Timed event registry.
//!
//! Pairs start and end calls for duration events. Entries started without an
//! explicit key get a derived key pushed onto a per-name LIFO stack, so nested
//! or re-entrant events sharing a name close innermost first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::telemetry::events::{EventLevel, Parameters};
use crate::telemetry::types::elapsed_seconds;

/// Identity of a running timed event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Caller-supplied key. Starting twice with the same key overwrites.
    Explicit(String),
    /// Key derived from the event name; only reachable through the LIFO stack.
    Derived { name: String, seq: u64 },
}

#[derive(Debug, Clone)]
pub struct TimedEntry {
    pub key: TimerKey,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub parameters: Parameters,
    pub level: EventLevel,
    seq: u64,
}

/// A resolved timed event, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTimedEvent {
    pub key: TimerKey,
    pub name: String,
    pub parameters: Parameters,
    pub level: EventLevel,
    pub started_at: DateTime<Utc>,
    pub elapsed: f64,
}

#[derive(Debug, Default)]
pub struct TimedEventRegistry {
    entries: HashMap<TimerKey, TimedEntry>,
    stacks: HashMap<String, Vec<TimerKey>>,
    next_seq: u64,
}

impl TimedEventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a new timed event. Emits nothing.
    pub fn start(
        &mut self,
        name: &str,
        started_at: DateTime<Utc>,
        parameters: Parameters,
        key: Option<String>,
        level: EventLevel,
    ) -> TimerKey {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = match key {
            Some(explicit) => TimerKey::Explicit(explicit),
            None => {
                let derived = TimerKey::Derived {
                    name: name.to_string(),
                    seq,
                };
                self.stacks
                    .entry(name.to_string())
                    .or_default()
                    .push(derived.clone());
                derived
            }
        };

        if self.entries.contains_key(&key) {
            debug!(name = %name, key = ?key, "Overwriting running timed event");
        }
        self.entries.insert(
            key.clone(),
            TimedEntry {
                key: key.clone(),
                name: name.to_string(),
                started_at,
                parameters,
                level,
                seq,
            },
        );
        key
    }

    /// Resolve and remove a running timed event.
    ///
    /// With `merge`, new parameters override stored ones key by key and `None`
    /// keeps the stored set. Without it, the new set replaces the stored one
    /// entirely and `None` clears it. Returns `None` when nothing matches.
    pub fn end(
        &mut self,
        name: &str,
        ended_at: DateTime<Utc>,
        parameters: Option<Parameters>,
        merge: bool,
        key: Option<&str>,
    ) -> Option<CompletedTimedEvent> {
        let entry = match key {
            Some(explicit) => self.entries.remove(&TimerKey::Explicit(explicit.to_string())),
            None => self.pop_derived(name),
        };

        let Some(entry) = entry else {
            debug!(name = %name, key = ?key, "No running timed event to end");
            return None;
        };

        let resolved = resolve_parameters(entry.parameters.clone(), parameters, merge);
        Some(complete(entry, resolved, ended_at))
    }

    /// Close every running event at `ended_at` with its stored parameters,
    /// in start order.
    pub fn close_all(&mut self, ended_at: DateTime<Utc>) -> Vec<CompletedTimedEvent> {
        let mut entries: Vec<TimedEntry> = self.entries.drain().map(|(_, e)| e).collect();
        self.stacks.clear();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|entry| {
                let parameters = entry.parameters.clone();
                complete(entry, parameters, ended_at)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stacks.clear();
    }

    fn pop_derived(&mut self, name: &str) -> Option<TimedEntry> {
        let stack = self.stacks.get_mut(name)?;
        let mut found = None;
        while let Some(key) = stack.pop() {
            if let Some(entry) = self.entries.remove(&key) {
                found = Some(entry);
                break;
            }
        }
        if stack.is_empty() {
            self.stacks.remove(name);
        }
        found
    }
}

fn resolve_parameters(
    stored: Parameters,
    incoming: Option<Parameters>,
    merge: bool,
) -> Parameters {
    match (merge, incoming) {
        (true, Some(incoming)) => {
            let mut merged = stored;
            merged.extend(incoming);
            merged
        }
        (true, None) => stored,
        (false, Some(incoming)) => incoming,
        (false, None) => Parameters::new(),
    }
}

fn complete(entry: TimedEntry, parameters: Parameters, ended_at: DateTime<Utc>) -> CompletedTimedEvent {
    CompletedTimedEvent {
        elapsed: elapsed_seconds(entry.started_at, ended_at),
        key: entry.key,
        name: entry.name,
        parameters,
        level: entry.level,
        started_at: entry.started_at,
    }
}
