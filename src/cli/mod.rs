//! Command-line front end.

mod commands;
mod render;

pub use commands::{is_verbose, run, Cli};
