//! Config loading facade.

use std::path::Path;

use tracing::debug;

use crate::config::merge::merge_policy;
use crate::config::sources::{environment, explicit_file, global_file};
use crate::config::LoggerConfig;
use crate::error::LoggerError;

/// Loads [`LoggerConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then `explicit` if given, then the
    /// environment. The result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<LoggerConfig, LoggerError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = environment::add_to_builder(builder);

        let config: LoggerConfig = builder.build()?.try_deserialize()?;
        Self::validated(config)
    }

    /// Defaults overlaid by a single TOML file. Ignores global and env sources.
    pub fn load_from_file(path: &Path) -> Result<LoggerConfig, LoggerError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = explicit_file::add_to_builder(builder, path)?;
        let config: LoggerConfig = builder.build()?.try_deserialize()?;
        Self::validated(config)
    }

    fn validated(config: LoggerConfig) -> Result<LoggerConfig, LoggerError> {
        config.validate().map_err(|errors| {
            LoggerError::Validation(errors.iter().map(|e| e.to_string()).collect())
        })?;
        debug!(
            buffering = config.buffer.enabled,
            log_level = ?config.log_level,
            "Loaded logger configuration"
        );
        Ok(config)
    }
}
