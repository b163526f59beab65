//! Host platform hook for bounded background execution.

use serde::{Deserialize, Serialize};

/// Opaque token granted by the host for a bounded stretch of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackgroundToken(pub u64);

/// Acquire/release API of the host platform.
///
/// When the granted window runs out the host reports it through
/// [`EventLogger::background_time_expired`](crate::telemetry::logger::EventLogger::background_time_expired).
pub trait BackgroundExecutionHost: Send + Sync {
    fn begin_background_task(&self) -> Option<BackgroundToken>;
    fn end_background_task(&self, token: BackgroundToken);
}

/// Host without background execution support. Never grants a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundHost;

impl BackgroundExecutionHost for NoBackgroundHost {
    fn begin_background_task(&self) -> Option<BackgroundToken> {
        None
    }

    fn end_background_task(&self, _token: BackgroundToken) {}
}
