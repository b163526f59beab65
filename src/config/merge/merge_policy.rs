//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only scalar knobs are seeded here; optional and map-valued fields fall back
/// to their serde defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("log_level", "normal")?
        .set_default("console_log_enabled", true)?
        .set_default("buffer.enabled", false)?
        .set_default("buffer.max_buffer_size", 500)?
        .set_default("buffer.sync_buffer_size_threshold", 50)?
        .set_default("buffer.sync_buffer_after_seconds", 30)?
        .set_default("buffer.sync_buffer_on_backgrounding", true)
}
