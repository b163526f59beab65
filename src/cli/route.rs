//! CLI route: single route table and run context. Dispatches to library services.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cli::command_name;
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, LoggerConfig};
use crate::error::LoggerError;
use crate::replay;
use crate::telemetry::events::{EventLevel, Parameters};
use crate::telemetry::routing::{SinkRegistry, TracingSink};
use crate::telemetry::runtime::LoggerRuntime;
use crate::telemetry::types::SystemClock;
use crate::telemetry::upload::{JsonLinesUploader, NoBackgroundHost};

/// One input line of `stream`.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    name: String,
    #[serde(default)]
    params: Parameters,
    #[serde(default = "default_level")]
    level: EventLevel,
}

fn default_level() -> EventLevel {
    EventLevel::Normal
}

/// Runtime context for CLI execution: the effective configuration and where it came from.
pub struct RunContext {
    config: LoggerConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Create run context from an optional config path. Uses ConfigLoader only.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, LoggerError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(None)?,
        };
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, LoggerError> {
        let started = Instant::now();
        let name = command_name(command);
        debug!(command = name, "Executing command");
        let result = self.execute_inner(command);
        info!(
            command = name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, LoggerError> {
        match command {
            Commands::Replay { script, format } => self.handle_replay(script, format),
            Commands::Stream { input, drain_ms } => {
                self.handle_stream(input.as_deref(), Duration::from_millis(*drain_ms))
            }
            Commands::Config { format } => self.handle_config(format),
            Commands::Validate => Ok(match &self.config_path {
                Some(path) => format!("Configuration OK ({})", path.display()),
                None => "Configuration OK".to_string(),
            }),
        }
    }

    fn handle_replay(&self, script: &Path, format: &str) -> Result<String, LoggerError> {
        let file = File::open(script)?;
        let steps = replay::parse_script(BufReader::new(file))?;
        info!(steps = steps.len(), script = %script.display(), "Replaying script");
        let report = replay::run(self.config.clone(), &steps);
        match format {
            "json" => serde_json::to_string_pretty(&report)
                .map_err(|e| LoggerError::Config(format!("Failed to render report: {}", e))),
            "text" => Ok(report.to_text()),
            other => Err(LoggerError::Config(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn handle_config(&self, format: &str) -> Result<String, LoggerError> {
        match format {
            "toml" => toml::to_string_pretty(&self.config)
                .map_err(|e| LoggerError::Config(format!("Failed to render config: {}", e))),
            "json" => serde_json::to_string_pretty(&self.config)
                .map_err(|e| LoggerError::Config(format!("Failed to render config: {}", e))),
            other => Err(LoggerError::Config(format!(
                "Invalid format: {} (must be 'toml' or 'json')",
                other
            ))),
        }
    }

    fn handle_stream(&self, input: Option<&Path>, drain: Duration) -> Result<String, LoggerError> {
        let reader: Box<dyn BufRead> = match input {
            Some(path) => Box::new(BufReader::new(File::open(path)?)),
            None => Box::new(BufReader::new(std::io::stdin())),
        };

        let mut config = self.config.clone();
        config.buffer.enabled = true;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async move {
            let sinks = SinkRegistry::new();
            sinks.register(Arc::new(TracingSink), 0);
            let (handle, task) = LoggerRuntime::spawn(
                config,
                sinks,
                Arc::new(JsonLinesUploader::new(std::io::stdout())),
                Arc::new(NoBackgroundHost),
                Arc::new(SystemClock),
            );
            handle.app_did_finish_launching();

            let mut logged = 0usize;
            for (index, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StreamEvent>(&line) {
                    Ok(event) => {
                        handle.log_event(event.name, event.params, event.level);
                        logged += 1;
                    }
                    Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed event"),
                }
            }

            handle.end_session();
            handle.sync();
            let drained = tokio::time::timeout(drain, async {
                loop {
                    let snapshot = handle.snapshot().await?;
                    if snapshot.stats.buffered == 0 && !snapshot.upload_in_flight {
                        return Ok::<_, LoggerError>(snapshot.stats);
                    }
                    if !snapshot.upload_in_flight {
                        handle.sync();
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;

            let stats = match drained {
                Ok(stats) => stats?,
                Err(_) => {
                    warn!("Timed out waiting for uploads to drain");
                    handle.snapshot().await?.stats
                }
            };
            handle.shutdown();
            let _ = task.await;

            Ok(format!(
                "Logged {} events; uploads started {}, succeeded {}, failed {}, dropped {}",
                logged,
                stats.uploads_started,
                stats.uploads_succeeded,
                stats.uploads_failed,
                stats.dropped
            ))
        })
    }
}
