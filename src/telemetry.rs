//! Telemetry domain: events, sessions, timed events, routing and uploads.

pub mod events;
pub mod logger;
pub mod routing;
pub mod runtime;
pub mod sessions;
pub mod timed;
pub mod types;
pub mod upload;

pub use events::{should_observe, EventLevel, LogLevel, LoggedEvent, Parameters};
pub use logger::EventLogger;
pub use routing::{EventSink, MemorySink, SinkHandle, SinkRegistry, TracingSink};
pub use runtime::{LoggerHandle, LoggerRuntime, LoggerSnapshot};
pub use sessions::{SessionState, TimedEventRestartPolicy};
pub use timed::TimerKey;
pub use types::{Clock, ManualClock, SystemClock};
pub use upload::{
    BackgroundExecutionHost, BackgroundToken, BufferConfig, EventUploader, JsonLinesUploader,
    NoBackgroundHost, PipelineStats,
};
