//! Environment source: EVENTLOG__LOG_LEVEL, EVENTLOG__BUFFER__MAX_BUFFER_SIZE, ...

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "EVENTLOG";

/// Add `EVENTLOG__*` variables. Nested keys use a double underscore.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
