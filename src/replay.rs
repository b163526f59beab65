//! Deterministic replay of scripted host activity.
//!
//! A script is JSON Lines, one step per line. Steps drive an [`EventLogger`]
//! on a manual clock and a scripted upload collaborator, so the same script
//! always yields the same dispatched events and upload batches.
//!
//! ```text
//! {"op":"log","name":"opened","params":{"screen":"home"}}
//! {"op":"start_timed","name":"load"}
//! {"op":"advance","seconds":2.5}
//! {"op":"end_timed","name":"load"}
//! {"op":"sync"}
//! {"op":"upload_fail"}
//! ```

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LoggerConfig;
use crate::error::{LoggerError, UploadError};
use crate::telemetry::events::{EventLevel, LoggedEvent, Parameters};
use crate::telemetry::logger::EventLogger;
use crate::telemetry::routing::{MemorySink, SinkRegistry, TracingSink};
use crate::telemetry::types::{Clock, ManualClock};
use crate::telemetry::upload::{
    BackgroundExecutionHost, BackgroundToken, BufferedRecord, PipelineStats, UploadBatch,
};
use parking_lot::Mutex;

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Launch,
    Log {
        name: String,
        #[serde(default)]
        params: Parameters,
        #[serde(default = "default_level")]
        level: EventLevel,
        /// Free-form text stored under the configured text key
        #[serde(default)]
        text: Option<String>,
    },
    StartTimed {
        name: String,
        #[serde(default)]
        params: Parameters,
        #[serde(default)]
        key: Option<String>,
        #[serde(default = "default_level")]
        level: EventLevel,
    },
    EndTimed {
        name: String,
        #[serde(default)]
        params: Option<Parameters>,
        #[serde(default = "default_merge")]
        merge: bool,
        #[serde(default)]
        key: Option<String>,
    },
    SetUserId {
        #[serde(default)]
        user_id: Option<String>,
    },
    EnsureSession,
    EndSession,
    Background,
    Foreground,
    BackgroundExpired,
    Advance {
        seconds: f64,
    },
    Tick,
    Sync,
    UploadOk,
    UploadFail {
        #[serde(default)]
        reason: Option<String>,
    },
    Reset,
}

fn default_level() -> EventLevel {
    EventLevel::Normal
}

fn default_merge() -> bool {
    true
}

/// Largest single clock advance a script may request (about 100 years).
const MAX_ADVANCE_SECONDS: f64 = 3_155_760_000.0;

/// Parse a JSON Lines script. Blank lines and `#` comments are skipped.
pub fn parse_script<R: BufRead>(reader: R) -> Result<Vec<Step>, LoggerError> {
    let mut steps = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step: Step = serde_json::from_str(trimmed).map_err(|e| {
            LoggerError::Config(format!("Invalid script step on line {}: {}", index + 1, e))
        })?;
        if let Step::Advance { seconds } = step {
            if !seconds.is_finite() || !(0.0..=MAX_ADVANCE_SECONDS).contains(&seconds) {
                return Err(LoggerError::Config(format!(
                    "Invalid advance on line {}: seconds must be between 0 and {}",
                    index + 1,
                    MAX_ADVANCE_SECONDS
                )));
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

/// Upload batch as seen by the scripted collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadAttempt {
    pub batch: u64,
    pub records: Vec<BufferedRecord>,
    pub succeeded: Option<bool>,
}

/// Result of a replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub events: Vec<LoggedEvent>,
    pub uploads: Vec<UploadAttempt>,
    pub buffered: Vec<BufferedRecord>,
    pub stats: PipelineStats,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl ReplayReport {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Events ({}):\n", self.events.len()));
        for event in &self.events {
            let timed = match event.duration {
                Some(d) => format!(" timed={}s", d),
                None => String::new(),
            };
            out.push_str(&format!(
                "  [{}] {}{} {}\n",
                event.level,
                event.name,
                timed,
                serde_json::Value::Object(event.parameters.clone())
            ));
        }
        out.push_str(&format!("Uploads ({}):\n", self.uploads.len()));
        for upload in &self.uploads {
            let status = match upload.succeeded {
                Some(true) => "ok",
                Some(false) => "failed",
                None => "pending",
            };
            out.push_str(&format!(
                "  batch {} records={} {}\n",
                upload.batch,
                upload.records.len(),
                status
            ));
        }
        out.push_str(&format!(
            "Buffered: {} (dropped {}, full {})\n",
            self.buffered.len(),
            self.stats.dropped,
            self.stats.full
        ));
        out.push_str(&format!(
            "Session: {}\nUser: {}",
            self.session_id.as_deref().unwrap_or("-"),
            self.user_id.as_deref().unwrap_or("-")
        ));
        out
    }
}

/// Background host that grants sequential tokens.
#[derive(Debug, Default)]
struct ScriptedHost {
    next: Mutex<u64>,
    held: Mutex<Option<BackgroundToken>>,
}

impl BackgroundExecutionHost for ScriptedHost {
    fn begin_background_task(&self) -> Option<BackgroundToken> {
        let mut next = self.next.lock();
        *next += 1;
        let token = BackgroundToken(*next);
        *self.held.lock() = Some(token);
        Some(token)
    }

    fn end_background_task(&self, token: BackgroundToken) {
        let mut held = self.held.lock();
        if *held == Some(token) {
            *held = None;
        }
    }
}

fn replay_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Run `steps` against a fresh logger built from `config`.
pub fn run(config: LoggerConfig, steps: &[Step]) -> ReplayReport {
    let sink = MemorySink::new();
    let sinks = SinkRegistry::new();
    sinks.register(Arc::new(sink.clone()), 0);
    sinks.register(Arc::new(TracingSink), 1);

    let clock = Arc::new(ManualClock::new(replay_epoch()));
    let host = Arc::new(ScriptedHost::default());
    let mut logger = EventLogger::new(config, sinks, host.clone(), clock.clone());

    let mut pending: VecDeque<UploadBatch> = VecDeque::new();
    let mut uploads: Vec<UploadAttempt> = Vec::new();

    for step in steps {
        debug!(step = ?step, "Replaying step");
        match step.clone() {
            Step::Launch => logger.app_did_finish_launching(),
            Step::Log {
                name,
                params,
                level,
                text,
            } => match text {
                Some(text) if level == EventLevel::Normal => logger.log_text(&name, params, text),
                Some(text) => {
                    let mut params = params;
                    let key = logger.config().text_parameter_key.clone();
                    params.insert(key, serde_json::Value::String(text));
                    logger.log_event(&name, params, level);
                }
                None => logger.log_event(&name, params, level),
            },
            Step::StartTimed {
                name,
                params,
                key,
                level,
            } => {
                logger.start_timed_event(&name, clock.now(), params, key, level);
            }
            Step::EndTimed {
                name,
                params,
                merge,
                key,
            } => logger.end_timed_event(&name, clock.now(), params, merge, key.as_deref()),
            Step::SetUserId { user_id } => logger.set_user_id(user_id),
            Step::EnsureSession => logger.ensure_session_is_active(),
            Step::EndSession => logger.end_session(),
            Step::Background => logger.did_enter_background(),
            Step::Foreground => logger.did_become_active(),
            Step::BackgroundExpired => {
                let held = *host.held.lock();
                if let Some(token) = held {
                    logger.background_time_expired(token);
                }
            }
            Step::Advance { seconds } => {
                clock.advance(Duration::milliseconds((seconds * 1000.0).round() as i64));
            }
            Step::Tick => logger.timer_tick(),
            Step::Sync => logger.sync(),
            Step::UploadOk => match pending.pop_front() {
                Some(batch) => {
                    mark(&mut uploads, batch.id.seq(), true);
                    logger.upload_did_succeed(batch.id);
                }
                None => warn!("upload_ok with no upload in flight"),
            },
            Step::UploadFail { reason } => match pending.pop_front() {
                Some(batch) => {
                    mark(&mut uploads, batch.id.seq(), false);
                    let reason = reason.unwrap_or_else(|| "scripted failure".to_string());
                    logger.upload_did_fail(batch.id, UploadError::Transport(reason));
                }
                None => warn!("upload_fail with no upload in flight"),
            },
            Step::Reset => {
                logger.reset();
                pending.clear();
            }
        }

        for batch in logger.take_pending_uploads() {
            uploads.push(UploadAttempt {
                batch: batch.id.seq(),
                records: batch.records.clone(),
                succeeded: None,
            });
            pending.push_back(batch);
        }
    }

    ReplayReport {
        events: sink.events(),
        uploads,
        buffered: logger.buffered_records(),
        stats: logger.stats(),
        session_id: logger.session_id().map(str::to_string),
        user_id: logger.user_id().map(str::to_string),
    }
}

fn mark(uploads: &mut [UploadAttempt], batch: u64, succeeded: bool) {
    if let Some(attempt) = uploads
        .iter_mut()
        .rev()
        .find(|a| a.batch == batch && a.succeeded.is_none())
    {
        attempt.succeeded = Some(succeeded);
    }
}
