//! Downstream dispatch: ordered sink registry and stock sinks.

pub mod bus;
pub mod sinks;

pub use bus::{SinkHandle, SinkRegistry};
pub use sinks::{EventSink, MemorySink, TracingSink};
