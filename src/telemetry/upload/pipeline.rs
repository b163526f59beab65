//! Buffered upload pipeline.
//!
//! Accumulates buffered records, hands at most one snapshot at a time to the
//! upload collaborator, and merges failed snapshots back ahead of anything
//! buffered while the upload was outstanding.
//!
//! Records of the in-flight snapshot count toward `max_buffer_size`, so a
//! requeue after failure can never push the buffer past its bound.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::telemetry::events::Parameters;
use crate::telemetry::types::unix_seconds;
use crate::telemetry::upload::background::{BackgroundExecutionHost, BackgroundToken};

/// One queued event in wire form: its parameters plus injected bookkeeping keys.
pub type BufferedRecord = Parameters;

/// Buffering and upload configuration.
///
/// Reserved key names set to an empty string are treated as disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Buffer events for the custom upload collaborator
    #[serde(default)]
    pub enabled: bool,

    /// Events beyond this many pending records are dropped
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// Sync as soon as this many records are buffered (0 disables)
    #[serde(default = "default_sync_buffer_size_threshold")]
    pub sync_buffer_size_threshold: usize,

    /// Sync when the last successful upload is this old (0 disables)
    #[serde(default = "default_sync_buffer_after_seconds")]
    pub sync_buffer_after_seconds: u64,

    /// Sync when the host app moves to the background
    #[serde(default = "default_true")]
    pub sync_buffer_on_backgrounding: bool,

    #[serde(default = "default_event_name_key")]
    pub event_name_key: Option<String>,

    #[serde(default = "default_timestamp_key")]
    pub timestamp_key: Option<String>,

    #[serde(default = "default_counter_key")]
    pub counter_key: Option<String>,

    /// Event dispatched once each time the buffer becomes full
    #[serde(default)]
    pub full_event_name: Option<String>,

    /// Parameters merged into every buffered record
    #[serde(default)]
    pub super_parameters: Parameters,

    /// Period of the owner task's timer tick
    #[serde(default = "default_timer_interval_ms")]
    pub timer_interval_ms: u64,

    /// How long a background token is kept for retries after acquisition
    #[serde(default = "default_background_grace_seconds")]
    pub background_grace_seconds: u64,
}

fn default_max_buffer_size() -> usize {
    500
}

fn default_sync_buffer_size_threshold() -> usize {
    50
}

fn default_sync_buffer_after_seconds() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_event_name_key() -> Option<String> {
    Some("event".to_string())
}

fn default_timestamp_key() -> Option<String> {
    Some("timestamp".to_string())
}

fn default_counter_key() -> Option<String> {
    Some("inc".to_string())
}

fn default_timer_interval_ms() -> u64 {
    1000
}

fn default_background_grace_seconds() -> u64 {
    10
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_buffer_size: default_max_buffer_size(),
            sync_buffer_size_threshold: default_sync_buffer_size_threshold(),
            sync_buffer_after_seconds: default_sync_buffer_after_seconds(),
            sync_buffer_on_backgrounding: default_true(),
            event_name_key: default_event_name_key(),
            timestamp_key: default_timestamp_key(),
            counter_key: default_counter_key(),
            full_event_name: None,
            super_parameters: Parameters::new(),
            timer_interval_ms: default_timer_interval_ms(),
            background_grace_seconds: default_background_grace_seconds(),
        }
    }
}

impl BufferConfig {
    /// Reserved key names that are switched on, in injection order.
    pub fn reserved_keys(&self) -> Vec<&str> {
        [&self.event_name_key, &self.timestamp_key, &self.counter_key]
            .into_iter()
            .filter_map(|key| reserved(key))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_buffer_size == 0 {
            return Err("max_buffer_size must be greater than 0".to_string());
        }
        if self.sync_buffer_size_threshold != 0
            && self.sync_buffer_size_threshold >= self.max_buffer_size
        {
            return Err(format!(
                "sync_buffer_size_threshold ({}) must be less than max_buffer_size ({})",
                self.sync_buffer_size_threshold, self.max_buffer_size
            ));
        }
        if self.timer_interval_ms == 0 {
            return Err("timer_interval_ms must be greater than 0".to_string());
        }
        let keys = self.reserved_keys();
        for (i, key) in keys.iter().enumerate() {
            if keys[i + 1..].contains(key) {
                return Err(format!("reserved parameter key '{}' is used twice", key));
            }
        }
        Ok(())
    }
}

fn reserved(key: &Option<String>) -> Option<&str> {
    key.as_deref().filter(|k| !k.is_empty())
}

/// Identifies one `sync()` attempt. Completions for other ids are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId {
    generation: u64,
    seq: u64,
}

impl BatchId {
    pub fn seq(self) -> u64 {
        self.seq
    }
}

/// Snapshot handed to the upload collaborator.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub id: BatchId,
    pub records: Vec<BufferedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended; `sync_due` when the size threshold has been reached.
    Buffered { sync_due: bool },
    /// Dropped at capacity; `became_full` on the not-full -> full edge only.
    Dropped { became_full: bool },
}

/// Pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub buffered: usize,
    pub in_flight: usize,
    pub uploads_started: u64,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub dropped: u64,
    pub full: bool,
}

#[derive(Debug)]
struct InFlight {
    id: BatchId,
    records: Vec<BufferedRecord>,
}

#[derive(Debug, Clone, Copy)]
struct HeldToken {
    token: BackgroundToken,
    acquired_at: DateTime<Utc>,
}

pub struct UploadPipeline {
    config: BufferConfig,
    host: Arc<dyn BackgroundExecutionHost>,
    buffer: VecDeque<BufferedRecord>,
    in_flight: Option<InFlight>,
    counter: u64,
    full: bool,
    last_sync: DateTime<Utc>,
    background: Option<HeldToken>,
    generation: u64,
    next_batch: u64,
    stats: PipelineStats,
}

impl UploadPipeline {
    pub fn new(
        config: BufferConfig,
        host: Arc<dyn BackgroundExecutionHost>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            host,
            buffer: VecDeque::new(),
            in_flight: None,
            counter: 1,
            full: false,
            last_sync: now,
            background: None,
            generation: 0,
            next_batch: 0,
            stats: PipelineStats::default(),
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &BufferedRecord> {
        self.buffer.iter()
    }

    pub fn upload_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn holds_background_token(&self) -> bool {
        self.background.is_some()
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        self.last_sync
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            buffered: self.buffer.len(),
            in_flight: self.in_flight.as_ref().map_or(0, |f| f.records.len()),
            full: self.full,
            ..self.stats.clone()
        }
    }

    /// Records pending anywhere in the pipeline: buffered plus in flight.
    fn occupancy(&self) -> usize {
        self.buffer.len() + self.in_flight.as_ref().map_or(0, |f| f.records.len())
    }

    /// Restart the per-session counter. Called when a new session id is minted.
    pub fn reset_counter(&mut self) {
        self.counter = 1;
    }

    pub fn enqueue(
        &mut self,
        name: &str,
        parameters: &Parameters,
        now: DateTime<Utc>,
    ) -> EnqueueOutcome {
        if self.occupancy() >= self.config.max_buffer_size {
            self.stats.dropped += 1;
            let became_full = !self.full;
            self.full = true;
            debug!(
                name = %name,
                max_size = self.config.max_buffer_size,
                "Event buffer full, dropping event"
            );
            return EnqueueOutcome::Dropped { became_full };
        }

        let record = self.build_record(name, parameters, now);
        self.buffer.push_back(record);
        self.counter += 1;
        self.full = false;

        let threshold = self.config.sync_buffer_size_threshold;
        EnqueueOutcome::Buffered {
            sync_due: threshold > 0 && self.buffer.len() >= threshold,
        }
    }

    fn build_record(&self, name: &str, parameters: &Parameters, now: DateTime<Utc>) -> BufferedRecord {
        let mut record = self.config.super_parameters.clone();
        record.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(key) = reserved(&self.config.event_name_key) {
            record.insert(key.to_string(), json!(name));
        }
        if let Some(key) = reserved(&self.config.timestamp_key) {
            record.insert(key.to_string(), json!(unix_seconds(now)));
        }
        if let Some(key) = reserved(&self.config.counter_key) {
            record.insert(key.to_string(), json!(self.counter));
        }
        record
    }

    /// Move the whole buffer into the in-flight snapshot.
    ///
    /// Returns `None` while another upload is outstanding or when there is
    /// nothing to send.
    pub fn begin_sync(&mut self) -> Option<UploadBatch> {
        if let Some(in_flight) = &self.in_flight {
            debug!(batch = in_flight.id.seq, "Upload already in flight, skipping sync");
            return None;
        }
        if self.buffer.is_empty() {
            return None;
        }

        let records: Vec<BufferedRecord> = self.buffer.drain(..).collect();
        let id = BatchId {
            generation: self.generation,
            seq: self.next_batch,
        };
        self.next_batch += 1;
        self.stats.uploads_started += 1;
        self.in_flight = Some(InFlight {
            id,
            records: records.clone(),
        });
        debug!(batch = id.seq, records = records.len(), "Starting buffered upload");
        Some(UploadBatch { id, records })
    }

    /// Apply the collaborator's verdict for `batch`. Returns false when the
    /// completion does not belong to the outstanding snapshot.
    pub fn finish_upload(
        &mut self,
        batch: BatchId,
        outcome: Result<(), UploadError>,
        now: DateTime<Utc>,
    ) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.id == batch => {}
            _ => {
                debug!(batch = batch.seq, "Ignoring completion for unknown upload");
                return false;
            }
        }
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };

        match outcome {
            Ok(()) => self.upload_did_succeed(in_flight, now),
            Err(err) => self.upload_did_fail(in_flight, err, now),
        }
        true
    }

    fn upload_did_succeed(&mut self, in_flight: InFlight, now: DateTime<Utc>) {
        debug!(
            batch = in_flight.id.seq,
            records = in_flight.records.len(),
            "Buffered upload succeeded"
        );
        self.stats.uploads_succeeded += 1;
        self.last_sync = now;
        if self.occupancy() < self.config.max_buffer_size {
            self.full = false;
        }
        self.release_background();
    }

    fn upload_did_fail(&mut self, in_flight: InFlight, err: UploadError, now: DateTime<Utc>) {
        warn!(
            batch = in_flight.id.seq,
            records = in_flight.records.len(),
            error = %err,
            "Buffered upload failed, requeueing"
        );
        self.stats.uploads_failed += 1;
        for record in in_flight.records.into_iter().rev() {
            self.buffer.push_front(record);
        }
        if self.grace_elapsed(now) {
            self.release_background();
        }
    }

    /// True when the periodic trigger says a sync is due.
    pub fn interval_elapsed(&self, now: DateTime<Utc>) -> bool {
        let after = self.config.sync_buffer_after_seconds;
        after > 0 && now - self.last_sync >= seconds(after)
    }

    /// Timer bookkeeping. Returns true when a sync should be attempted.
    pub fn tick(&mut self, now: DateTime<Utc>, backgrounded: bool) -> bool {
        if self.background.is_some() && self.in_flight.is_none() {
            if self.grace_elapsed(now) || !backgrounded {
                self.release_background();
            } else if !self.buffer.is_empty() {
                return true;
            }
        }
        self.interval_elapsed(now)
    }

    /// Acquire a background token ahead of a backgrounding sync.
    pub fn acquire_background(&mut self, now: DateTime<Utc>) {
        if self.background.is_some() {
            return;
        }
        if let Some(token) = self.host.begin_background_task() {
            debug!(token = token.0, "Acquired background execution token");
            self.background = Some(HeldToken {
                token,
                acquired_at: now,
            });
        }
    }

    /// Host reported the execution window ran out.
    pub fn background_expired(&mut self, token: BackgroundToken) {
        match self.background {
            Some(held) if held.token == token => {
                debug!(token = token.0, "Background execution window expired");
                self.release_background();
            }
            _ => {}
        }
    }

    pub fn release_background(&mut self) {
        if let Some(held) = self.background.take() {
            self.host.end_background_task(held.token);
        }
    }

    fn grace_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.background.map_or(true, |held| {
            now - held.acquired_at >= seconds(self.config.background_grace_seconds)
        })
    }

    /// Drop all pending records and bookkeeping. Completions for batches
    /// started before the reset are ignored afterwards.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.release_background();
        self.buffer.clear();
        self.in_flight = None;
        self.counter = 1;
        self.full = false;
        self.last_sync = now;
        self.generation += 1;
        self.next_batch = 0;
        self.stats = PipelineStats::default();
    }
}

/// Configured seconds as a delta, saturating past chrono's range.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
