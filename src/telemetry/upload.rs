//! Buffered upload pipeline: bounded local buffer, batch snapshots, upload
//! collaborator contract and background execution tokens.

pub mod background;
pub mod pipeline;
pub mod uploader;

pub use background::{BackgroundExecutionHost, BackgroundToken, NoBackgroundHost};
pub use pipeline::{
    BatchId, BufferConfig, BufferedRecord, EnqueueOutcome, PipelineStats, UploadBatch,
    UploadPipeline,
};
pub use uploader::{EventUploader, JsonLinesUploader};
