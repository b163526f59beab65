//! Shared test utilities for integration tests
//!
//! Provides isolated XDG/HOME environments, scripted upload collaborators and
//! background hosts, and polling helpers for the async runtime.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventlog::config::LoggerConfig;
use eventlog::error::UploadError;
use eventlog::telemetry::runtime::{LoggerHandle, LoggerRuntime, LoggerSnapshot};
use eventlog::telemetry::upload::{
    BackgroundExecutionHost, BackgroundToken, BufferedRecord, EventUploader, NoBackgroundHost,
};
use eventlog::telemetry::{ManualClock, MemorySink, SinkRegistry};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Environment variable state to restore after test
struct EnvState {
    vars: Vec<(String, Option<String>)>,
}

impl EnvState {
    fn capture(names: &[&str]) -> Self {
        Self {
            vars: names
                .iter()
                .map(|name| (name.to_string(), std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(&mut self) {
        for (name, value) in self.vars.drain(..) {
            match value {
                Some(orig) => std::env::set_var(&name, orig),
                None => std::env::remove_var(&name),
            }
        }
    }
}

impl Drop for EnvState {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointing into `test_dir`, plus any
/// extra variables in `env`. Everything is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, env: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut names = vec!["HOME", "XDG_CONFIG_HOME"];
    names.extend(env.iter().map(|(name, _)| *name));
    let _env_state = EnvState::capture(&names);

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());
    for (name, value) in env {
        std::env::set_var(name, value);
    }

    // `_env_state` restores the environment on drop, even if `f` panics.
    f()
}

/// Write `contents` to `name` inside `dir`, creating parents.
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    Ok(path)
}

/// Uploader that records batches, answers from a script of outcomes
/// (default `Ok`) and can hold uploads open until released.
pub struct ScriptedUploader {
    batches: Mutex<Vec<Vec<BufferedRecord>>>,
    outcomes: Mutex<VecDeque<Result<(), UploadError>>>,
    gate: Option<Semaphore>,
}

impl ScriptedUploader {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            outcomes: Mutex::new(VecDeque::new()),
            gate: None,
        }
    }

    /// Uploads block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn push_outcome(&self, outcome: Result<(), UploadError>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn batches(&self) -> Vec<Vec<BufferedRecord>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl EventUploader for ScriptedUploader {
    async fn upload_events(&self, records: Vec<BufferedRecord>) -> Result<(), UploadError> {
        self.batches.lock().push(records);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| UploadError::Transport(e.to_string()))?;
            permit.forget();
        }
        let outcome = self.outcomes.lock().pop_front();
        outcome.unwrap_or(Ok(()))
    }
}

/// Background host that hands out sequential tokens and records releases.
#[derive(Default)]
pub struct CountingHost {
    next: Mutex<u64>,
    pub begun: Mutex<Vec<BackgroundToken>>,
    pub ended: Mutex<Vec<BackgroundToken>>,
}

impl BackgroundExecutionHost for CountingHost {
    fn begin_background_task(&self) -> Option<BackgroundToken> {
        let mut next = self.next.lock();
        *next += 1;
        let token = BackgroundToken(*next);
        self.begun.lock().push(token);
        Some(token)
    }

    fn end_background_task(&self, token: BackgroundToken) {
        self.ended.lock().push(token);
    }
}

/// A running logger plus everything a test wants to observe.
pub struct Harness {
    pub handle: LoggerHandle,
    pub task: JoinHandle<()>,
    pub sink: MemorySink,
    pub uploader: Arc<ScriptedUploader>,
    pub clock: Arc<ManualClock>,
}

pub fn spawn_logger(config: LoggerConfig, uploader: ScriptedUploader) -> Harness {
    spawn_logger_with_host(config, uploader, Arc::new(NoBackgroundHost))
}

pub fn spawn_logger_with_host(
    config: LoggerConfig,
    uploader: ScriptedUploader,
    host: Arc<dyn BackgroundExecutionHost>,
) -> Harness {
    let sink = MemorySink::new();
    let sinks = SinkRegistry::new();
    sinks.register(Arc::new(sink.clone()), 0);
    let uploader = Arc::new(uploader);
    let clock = Arc::new(ManualClock::default());
    let (handle, task) =
        LoggerRuntime::spawn(config, sinks, uploader.clone(), host, clock.clone());
    Harness {
        handle,
        task,
        sink,
        uploader,
        clock,
    }
}

/// Buffering on, threshold trigger off, no periodic sync.
pub fn buffered_config(max_buffer_size: usize) -> LoggerConfig {
    let mut config = LoggerConfig::default();
    config.buffer.enabled = true;
    config.buffer.max_buffer_size = max_buffer_size;
    config.buffer.sync_buffer_size_threshold = 0;
    config.buffer.sync_buffer_after_seconds = 0;
    config
}

/// Poll the runtime until `predicate` holds. Panics after two seconds.
pub async fn wait_for<F>(handle: &LoggerHandle, predicate: F) -> LoggerSnapshot
where
    F: Fn(&LoggerSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = handle.snapshot().await.unwrap();
        if predicate(&snapshot) {
            return snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached, last snapshot: {:?}", snapshot);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Event names of the buffered records, in order.
pub fn record_names(records: &[BufferedRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["event"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Wait until the uploader has been handed at least `count` batches.
pub async fn wait_for_batches(uploader: &ScriptedUploader, count: usize) -> Vec<Vec<BufferedRecord>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let batches = uploader.batches();
        if batches.len() >= count {
            return batches;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("expected {} upload batches, saw {}", count, batches.len());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
