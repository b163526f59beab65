//! Integration tests for the eventlog engine

mod cli_commands;
mod runtime_lifecycle;
mod test_utils;
mod xdg_config;
