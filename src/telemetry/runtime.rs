//! Async owner for [`EventLogger`].
//!
//! The logger lives on a single tokio task. Callers talk to it through a
//! cloneable [`LoggerHandle`] that sends commands over an unbounded channel,
//! so logging never blocks and every mutation is serialized on the owner.
//! Uploads run on their own tasks and report back to the owner, which is the
//! only place their outcome is applied. The loop stops on `shutdown` or when
//! every handle has been dropped.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::LoggerConfig;
use crate::error::{LoggerError, UploadError};
use crate::telemetry::events::{EventLevel, Parameters};
use crate::telemetry::logger::EventLogger;
use crate::telemetry::routing::SinkRegistry;
use crate::telemetry::sessions::SessionState;
use crate::telemetry::types::Clock;
use crate::telemetry::upload::{
    BackgroundExecutionHost, BackgroundToken, BatchId, BufferedRecord, EventUploader,
    PipelineStats,
};

/// Point-in-time view of the logger state.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerSnapshot {
    pub session_id: Option<String>,
    pub session_state: SessionState,
    pub user_id: Option<String>,
    pub backgrounded: bool,
    pub open_timed_events: usize,
    pub upload_in_flight: bool,
    pub stats: PipelineStats,
}

enum Command {
    Log {
        name: String,
        parameters: Parameters,
        level: EventLevel,
    },
    StartTimed {
        name: String,
        started_at: Option<DateTime<Utc>>,
        parameters: Parameters,
        key: Option<String>,
        level: EventLevel,
    },
    EndTimed {
        name: String,
        ended_at: Option<DateTime<Utc>>,
        parameters: Option<Parameters>,
        merge: bool,
        key: Option<String>,
    },
    EnsureSessionExists,
    EnsureSessionActive,
    EndSession,
    SetUserId(Option<String>),
    AppDidFinishLaunching,
    DidEnterBackground,
    DidBecomeActive,
    BackgroundTimeExpired(BackgroundToken),
    Sync,
    Tick,
    Reset,
    Snapshot(oneshot::Sender<LoggerSnapshot>),
    BufferedRecords(oneshot::Sender<Vec<BufferedRecord>>),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Completion report from an upload task.
struct UploadFinished {
    batch: BatchId,
    outcome: Result<(), UploadError>,
}

/// Cloneable front door to a running logger.
#[derive(Clone)]
pub struct LoggerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl LoggerHandle {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Logger runtime stopped, dropping command");
        }
    }

    pub fn log_event(&self, name: impl Into<String>, parameters: Parameters, level: EventLevel) {
        self.send(Command::Log {
            name: name.into(),
            parameters,
            level,
        });
    }

    pub fn log(&self, name: impl Into<String>) {
        self.log_event(name, Parameters::new(), EventLevel::Normal);
    }

    /// Start a timed event. `started_at` defaults to the logger clock.
    pub fn start_timed_event(
        &self,
        name: impl Into<String>,
        started_at: Option<DateTime<Utc>>,
        parameters: Parameters,
        key: Option<String>,
        level: EventLevel,
    ) {
        self.send(Command::StartTimed {
            name: name.into(),
            started_at,
            parameters,
            key,
            level,
        });
    }

    pub fn end_timed_event(
        &self,
        name: impl Into<String>,
        ended_at: Option<DateTime<Utc>>,
        parameters: Option<Parameters>,
        merge: bool,
        key: Option<String>,
    ) {
        self.send(Command::EndTimed {
            name: name.into(),
            ended_at,
            parameters,
            merge,
            key,
        });
    }

    pub fn ensure_session_exists(&self) {
        self.send(Command::EnsureSessionExists);
    }

    pub fn ensure_session_is_active(&self) {
        self.send(Command::EnsureSessionActive);
    }

    pub fn end_session(&self) {
        self.send(Command::EndSession);
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.send(Command::SetUserId(user_id));
    }

    pub fn app_did_finish_launching(&self) {
        self.send(Command::AppDidFinishLaunching);
    }

    pub fn did_enter_background(&self) {
        self.send(Command::DidEnterBackground);
    }

    pub fn did_become_active(&self) {
        self.send(Command::DidBecomeActive);
    }

    pub fn background_time_expired(&self, token: BackgroundToken) {
        self.send(Command::BackgroundTimeExpired(token));
    }

    pub fn sync(&self) {
        self.send(Command::Sync);
    }

    /// Run one timer tick now, independent of the periodic interval.
    pub fn tick(&self) {
        self.send(Command::Tick);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    pub async fn snapshot(&self) -> Result<LoggerSnapshot, LoggerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(tx))
            .map_err(|_| LoggerError::RuntimeClosed)?;
        rx.await.map_err(|_| LoggerError::RuntimeClosed)
    }

    pub async fn buffered_records(&self) -> Result<Vec<BufferedRecord>, LoggerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::BufferedRecords(tx))
            .map_err(|_| LoggerError::RuntimeClosed)?;
        rx.await.map_err(|_| LoggerError::RuntimeClosed)
    }

    /// Resolves once every command sent before it has been applied.
    pub async fn flush(&self) -> Result<(), LoggerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| LoggerError::RuntimeClosed)?;
        rx.await.map_err(|_| LoggerError::RuntimeClosed)
    }

    /// Stop the owner loop. Pending uploads are abandoned.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }
}

/// Owner task wiring a logger to its uploader and timer.
pub struct LoggerRuntime {
    logger: EventLogger,
    uploader: Arc<dyn EventUploader>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedSender<UploadFinished>,
    finished: mpsc::UnboundedReceiver<UploadFinished>,
    uploads: Vec<JoinHandle<()>>,
}

impl LoggerRuntime {
    /// Spawn the owner loop on the current tokio runtime.
    pub fn spawn(
        config: LoggerConfig,
        sinks: SinkRegistry,
        uploader: Arc<dyn EventUploader>,
        host: Arc<dyn BackgroundExecutionHost>,
        clock: Arc<dyn Clock>,
    ) -> (LoggerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (completions, finished) = mpsc::unbounded_channel();
        let runtime = LoggerRuntime {
            logger: EventLogger::new(config, sinks, host, clock),
            uploader,
            commands: rx,
            completions,
            finished,
            uploads: Vec::new(),
        };
        let task = tokio::spawn(runtime.run());
        (LoggerHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        let buffer = self.logger.config().buffer.clone();
        let mut timer = interval(StdDuration::from_millis(buffer.timer_interval_ms.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            buffering = buffer.enabled,
            sinks = self.logger.sinks().len(),
            "Event logger started"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.apply(command) {
                        break;
                    }
                }
                Some(done) = self.finished.recv() => {
                    self.logger.upload_finished(done.batch, done.outcome);
                }
                _ = timer.tick(), if buffer.enabled => {
                    self.logger.timer_tick();
                }
            }
            self.start_pending_uploads();
        }

        for upload in self.uploads.drain(..) {
            upload.abort();
        }
        info!("Event logger stopped");
    }

    /// Returns false when the loop should stop.
    fn apply(&mut self, command: Command) -> bool {
        let logger = &mut self.logger;
        match command {
            Command::Log {
                name,
                parameters,
                level,
            } => logger.log_event(&name, parameters, level),
            Command::StartTimed {
                name,
                started_at,
                parameters,
                key,
                level,
            } => {
                let started_at = started_at.unwrap_or_else(|| logger.now());
                logger.start_timed_event(&name, started_at, parameters, key, level);
            }
            Command::EndTimed {
                name,
                ended_at,
                parameters,
                merge,
                key,
            } => {
                let ended_at = ended_at.unwrap_or_else(|| logger.now());
                logger.end_timed_event(&name, ended_at, parameters, merge, key.as_deref());
            }
            Command::EnsureSessionExists => logger.ensure_session_exists(),
            Command::EnsureSessionActive => logger.ensure_session_is_active(),
            Command::EndSession => logger.end_session(),
            Command::SetUserId(user_id) => logger.set_user_id(user_id),
            Command::AppDidFinishLaunching => logger.app_did_finish_launching(),
            Command::DidEnterBackground => logger.did_enter_background(),
            Command::DidBecomeActive => logger.did_become_active(),
            Command::BackgroundTimeExpired(token) => logger.background_time_expired(token),
            Command::Sync => logger.sync(),
            Command::Tick => logger.timer_tick(),
            Command::Reset => {
                for upload in self.uploads.drain(..) {
                    upload.abort();
                }
                self.logger.reset();
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(LoggerSnapshot {
                    session_id: logger.session_id().map(str::to_string),
                    session_state: logger.session_state(),
                    user_id: logger.user_id().map(str::to_string),
                    backgrounded: logger.is_backgrounded(),
                    open_timed_events: logger.open_timed_events(),
                    upload_in_flight: logger.upload_in_flight(),
                    stats: logger.stats(),
                });
            }
            Command::BufferedRecords(reply) => {
                let _ = reply.send(logger.buffered_records());
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn start_pending_uploads(&mut self) {
        self.uploads.retain(|upload| !upload.is_finished());
        for batch in self.logger.take_pending_uploads() {
            let uploader = Arc::clone(&self.uploader);
            let completions = self.completions.clone();
            let id = batch.id;
            debug!(batch = id.seq(), records = batch.records.len(), "Dispatching upload");
            self.uploads.push(tokio::spawn(async move {
                let outcome = uploader.upload_events(batch.records).await;
                if let Err(err) = &outcome {
                    warn!(batch = id.seq(), error = %err, "Upload attempt failed");
                }
                let _ = completions.send(UploadFinished { batch: id, outcome });
            }));
        }
    }
}
