//! CLI command-name contract used in log fields.

use crate::cli::parse::Commands;

/// Command name string for logging (e.g. "replay", "config").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Replay { .. } => "replay",
        Commands::Stream { .. } => "stream",
        Commands::Config { .. } => "config",
        Commands::Validate => "validate",
    }
}
