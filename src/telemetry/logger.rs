//! Event logger state machine.
//!
//! `EventLogger` owns the session tracker, the timed event registry and the
//! upload pipeline, and is mutated from exactly one owner. Every terminal
//! event goes through [`EventLogger::handle_event`], which forwards it to the
//! registered sinks and, when buffering is on, to the upload pipeline.
//!
//! Uploads are not started here. `sync()` moves a snapshot into the outbox;
//! the owner drains it with [`EventLogger::take_pending_uploads`] and reports
//! back through [`EventLogger::upload_finished`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::config::LoggerConfig;
use crate::error::UploadError;
use crate::telemetry::events::{should_observe, EventLevel, LoggedEvent, Parameters};
use crate::telemetry::routing::SinkRegistry;
use crate::telemetry::sessions::{SessionState, SessionTracker, TimedEventRestartPolicy};
use crate::telemetry::timed::{CompletedTimedEvent, TimedEventRegistry, TimerKey};
use crate::telemetry::types::Clock;
use crate::telemetry::upload::{
    BackgroundExecutionHost, BackgroundToken, BatchId, BufferedRecord, EnqueueOutcome,
    PipelineStats, UploadBatch, UploadPipeline,
};

pub struct EventLogger {
    config: LoggerConfig,
    clock: Arc<dyn Clock>,
    sinks: SinkRegistry,
    session: SessionTracker,
    timed: TimedEventRegistry,
    pipeline: UploadPipeline,
    user_id: Option<String>,
    outbox: Vec<UploadBatch>,
}

impl EventLogger {
    pub fn new(
        config: LoggerConfig,
        sinks: SinkRegistry,
        host: Arc<dyn BackgroundExecutionHost>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pipeline = UploadPipeline::new(config.buffer.clone(), host, clock.now());
        Self {
            config,
            clock,
            sinks,
            session: SessionTracker::new(),
            timed: TimedEventRegistry::new(),
            pipeline,
            user_id: None,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_backgrounded(&self) -> bool {
        self.session.is_backgrounded()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn open_timed_events(&self) -> usize {
        self.timed.len()
    }

    pub fn buffered_records(&self) -> Vec<BufferedRecord> {
        self.pipeline.records().cloned().collect()
    }

    pub fn upload_in_flight(&self) -> bool {
        self.pipeline.upload_in_flight()
    }

    pub fn holds_background_token(&self) -> bool {
        self.pipeline.holds_background_token()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn trace(&self, message: &str) {
        if self.config.verbose_console_logging {
            debug!(
                target: "eventlog::trace",
                session = ?self.session.session_id(),
                state = self.session.state().as_str(),
                "{}",
                message
            );
        }
    }

    /// Broadcast the launch hook to every sink.
    pub fn app_did_finish_launching(&mut self) {
        self.trace("app did finish launching");
        self.sinks.app_did_finish_launching();
    }

    // ------------------------------------------------------------------
    // Primary logging operations
    // ------------------------------------------------------------------

    pub fn log_event(&mut self, name: &str, parameters: Parameters, level: EventLevel) {
        self.echo("", name, &parameters, level);
        if !should_observe(level, self.config.log_level) {
            return;
        }
        self.ensure_session_is_active();
        self.handle_event(LoggedEvent::instant(name, parameters, level));
    }

    /// Record the start of a timed event. Dispatches nothing.
    pub fn start_timed_event(
        &mut self,
        name: &str,
        started_at: DateTime<Utc>,
        parameters: Parameters,
        key: Option<String>,
        level: EventLevel,
    ) -> TimerKey {
        self.echo("start ", name, &parameters, level);
        if should_observe(level, self.config.log_level) {
            self.ensure_session_is_active();
        }
        self.timed.start(name, started_at, parameters, key, level)
    }

    pub fn end_timed_event(
        &mut self,
        name: &str,
        ended_at: DateTime<Utc>,
        parameters: Option<Parameters>,
        merge: bool,
        key: Option<&str>,
    ) {
        if let Some(completed) = self.timed.end(name, ended_at, parameters, merge, key) {
            self.finish_timed(completed);
        }
    }

    fn finish_timed(&mut self, completed: CompletedTimedEvent) {
        let mut parameters = completed.parameters;
        if let Some(key) = self.config.duration_key() {
            parameters.insert(key.to_string(), json!(completed.elapsed));
        }
        self.echo("end ", &completed.name, &parameters, completed.level);
        if !should_observe(completed.level, self.config.log_level) {
            return;
        }
        self.handle_event(LoggedEvent::timed(
            completed.name,
            parameters,
            completed.level,
            completed.elapsed,
        ));
    }

    /// Downstream dispatch: every terminal event passes through here.
    pub fn handle_event(&mut self, event: LoggedEvent) {
        self.sinks.dispatch(&event);
        if !self.config.buffer.enabled {
            return;
        }

        let now = self.now();
        match self.pipeline.enqueue(&event.name, &event.parameters, now) {
            EnqueueOutcome::Buffered { sync_due: true } => {
                self.trace("buffer threshold reached");
                self.sync();
            }
            EnqueueOutcome::Buffered { sync_due: false } => {}
            EnqueueOutcome::Dropped { became_full: true } => {
                if let Some(name) = self.config.buffer.full_event_name.clone() {
                    self.emit(&name, Parameters::new(), EventLevel::Error);
                }
            }
            EnqueueOutcome::Dropped { became_full: false } => {}
        }
    }

    /// Filtered dispatch for events raised by the logger itself.
    fn emit(&mut self, name: &str, parameters: Parameters, level: EventLevel) {
        self.echo("", name, &parameters, level);
        if should_observe(level, self.config.log_level) {
            self.handle_event(LoggedEvent::instant(name, parameters, level));
        }
    }

    fn echo(&self, phase: &str, name: &str, parameters: &Parameters, level: EventLevel) {
        if !self.config.console_log_enabled
            || !should_observe(level, self.config.console_threshold())
        {
            return;
        }
        info!(
            target: "eventlog::console",
            "{}{}{} [{}] {}",
            self.config.console_log_prefix,
            phase,
            name,
            level,
            serde_json::Value::Object(parameters.clone())
        );
    }

    // ------------------------------------------------------------------
    // Convenience forms
    // ------------------------------------------------------------------

    pub fn log(&mut self, name: &str) {
        self.log_event(name, Parameters::new(), EventLevel::Normal);
    }

    pub fn log_text(&mut self, name: &str, parameters: Parameters, text: impl Into<String>) {
        let mut parameters = parameters;
        parameters.insert(
            self.config.text_parameter_key.clone(),
            serde_json::Value::String(text.into()),
        );
        self.log_event(name, parameters, EventLevel::Normal);
    }

    pub fn start_timed(&mut self, name: &str, parameters: Parameters) -> TimerKey {
        let now = self.now();
        self.start_timed_event(name, now, parameters, None, EventLevel::Normal)
    }

    pub fn end_timed(&mut self, name: &str, parameters: Option<Parameters>, merge: bool) {
        let now = self.now();
        self.end_timed_event(name, now, parameters, merge, None);
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn ensure_session_exists(&mut self) {
        let now = self.now();
        if self.session.ensure_exists(now) {
            self.pipeline.reset_counter();
            self.trace("session created");
        }
    }

    pub fn ensure_session_is_active(&mut self) {
        self.ensure_session_exists();
        if !self.session.activate() {
            return;
        }
        self.trace("session started");
        if let Some(name) = self.config.start_session_event_name.clone() {
            let parameters = self.config.session_event_super_parameters.clone();
            self.emit(&name, parameters, EventLevel::Normal);
        }
    }

    pub fn end_session(&mut self) {
        self.close_session();
    }

    /// Force-close timed events, emit the end event, and clear the session.
    /// Returns the timed events that were closed.
    fn close_session(&mut self) -> Vec<CompletedTimedEvent> {
        let now = self.now();
        let closed = self.timed.close_all(now);
        for completed in closed.iter().cloned() {
            self.finish_timed(completed);
        }

        if self.session.is_active() {
            if let Some(name) = self.config.end_session_event_name.clone() {
                let parameters = self.config.session_event_super_parameters.clone();
                self.emit(&name, parameters, EventLevel::Normal);
            }
        }
        if let Some(ended) = self.session.end() {
            if self.config.verbose_console_logging {
                debug!(target: "eventlog::trace", session = %ended, "session ended");
            }
        }
        closed
    }

    /// Reassign the owning identity. A different value rotates the session.
    pub fn set_user_id(&mut self, user_id: Option<String>) {
        let user_id = user_id.filter(|id| !id.is_empty());
        if user_id == self.user_id {
            return;
        }

        let was_active = self.session.is_active();
        let closed = self.close_session();
        self.user_id = user_id;
        self.trace("identity changed");

        if was_active && !self.session.is_backgrounded() {
            self.ensure_session_is_active();
        }

        // Restarted timers wait for the next activation like any other event.
        if self.config.restart_policy() == TimedEventRestartPolicy::RestartInNewSession {
            let now = self.now();
            for completed in closed {
                let key = match completed.key {
                    TimerKey::Explicit(key) => Some(key),
                    TimerKey::Derived { .. } => None,
                };
                self.timed.start(
                    &completed.name,
                    now,
                    completed.parameters,
                    key,
                    completed.level,
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Host lifecycle
    // ------------------------------------------------------------------

    pub fn did_enter_background(&mut self) {
        self.session.set_backgrounded(true);
        if !self.config.buffer.sync_buffer_on_backgrounding {
            return;
        }
        self.end_session();
        if self.config.buffer.enabled {
            let now = self.now();
            self.pipeline.acquire_background(now);
            self.sync();
            if !self.pipeline.upload_in_flight() {
                self.pipeline.release_background();
            }
        }
    }

    pub fn did_become_active(&mut self) {
        self.session.set_backgrounded(false);
        self.pipeline.release_background();
        self.ensure_session_is_active();
    }

    pub fn background_time_expired(&mut self, token: BackgroundToken) {
        self.pipeline.background_expired(token);
    }

    // ------------------------------------------------------------------
    // Upload pipeline
    // ------------------------------------------------------------------

    /// Periodic timer tick.
    pub fn timer_tick(&mut self) {
        if !self.config.buffer.enabled {
            return;
        }
        let now = self.now();
        if self.pipeline.tick(now, self.session.is_backgrounded()) {
            self.sync();
        }
    }

    /// Snapshot the buffer for upload unless one is already in flight.
    pub fn sync(&mut self) {
        if !self.config.buffer.enabled {
            return;
        }
        if let Some(batch) = self.pipeline.begin_sync() {
            self.trace("sync started");
            self.outbox.push(batch);
        }
    }

    /// Batches that must be handed to the upload collaborator.
    pub fn take_pending_uploads(&mut self) -> Vec<UploadBatch> {
        std::mem::take(&mut self.outbox)
    }

    pub fn upload_finished(&mut self, batch: BatchId, outcome: Result<(), UploadError>) {
        let now = self.now();
        if self.pipeline.finish_upload(batch, outcome, now) {
            self.trace("sync finished");
        }
    }

    pub fn upload_did_succeed(&mut self, batch: BatchId) {
        self.upload_finished(batch, Ok(()));
    }

    pub fn upload_did_fail(&mut self, batch: BatchId, error: UploadError) {
        self.upload_finished(batch, Err(error));
    }

    /// Clear all session, timed event and buffer state. Configuration, sinks,
    /// uploader wiring and the clock are kept.
    pub fn reset(&mut self) {
        let now = self.now();
        let backgrounded = self.session.is_backgrounded();
        self.timed.clear();
        self.session = SessionTracker::new();
        self.session.set_backgrounded(backgrounded);
        self.pipeline.reset(now);
        self.user_id = None;
        self.outbox.clear();
        self.trace("logger reset");
    }
}
