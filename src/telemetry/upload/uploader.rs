//! Upload collaborator contract.

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::UploadError;
use crate::telemetry::upload::pipeline::BufferedRecord;

/// Transmits one batch of buffered records to a remote collector.
///
/// Called with a non-empty, chronologically ordered batch. The returned
/// future may take arbitrarily long; its outcome is marshaled back onto the
/// logger's owner task by the runtime. `Err` requeues the whole batch.
#[async_trait]
pub trait EventUploader: Send + Sync {
    async fn upload_events(&self, records: Vec<BufferedRecord>) -> Result<(), UploadError>;
}

/// Writes each batch as one JSON array per line.
pub struct JsonLinesUploader<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesUploader<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send> EventUploader for JsonLinesUploader<W> {
    async fn upload_events(&self, records: Vec<BufferedRecord>) -> Result<(), UploadError> {
        let line = serde_json::to_string(&records)
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line).map_err(|e| UploadError::Transport(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| UploadError::Transport(e.to_string()))
    }
}
