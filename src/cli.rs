//! CLI domain: parse, route, help and output only.
//! Route handlers stay thin and call into the library.

mod help;
mod output;
mod parse;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use route::RunContext;
