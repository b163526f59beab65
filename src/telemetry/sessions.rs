//! Session lifecycle: tracker state and identity-change policy.

pub mod policy;
pub mod tracker;

pub use policy::{SessionState, TimedEventRestartPolicy};
pub use tracker::SessionTracker;
