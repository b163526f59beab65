//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::LoggerError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &LoggerError) -> String {
    match e {
        LoggerError::Validation(errors) => {
            let mut out = String::from("Invalid configuration:");
            for error in errors {
                out.push_str("\n  - ");
                out.push_str(error);
            }
            out
        }
        other => other.to_string(),
    }
}
