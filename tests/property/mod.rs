//! Property-based tests for the event pipeline

mod buffer;
mod filter;
