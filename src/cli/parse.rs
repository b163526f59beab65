//! CLI parse: clap types for eventlog. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// eventlog - client-side event logging engine
#[derive(Parser)]
#[command(name = "eventlog")]
#[command(about = "Replay and inspect event logging sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a JSON Lines script on a manual clock and report the outcome
    Replay {
        /// Script file, one step per line
        script: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Log JSON events from a file or stdin and upload batches to stdout
    Stream {
        /// Input file (default: stdin)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Milliseconds to wait for outstanding uploads on exit
        #[arg(long, default_value = "2000")]
        drain_ms: u64,
    },
    /// Show the effective configuration
    Config {
        /// Output format (toml or json)
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Validate the effective configuration
    Validate,
}
