//! Command-line interface for calforge.
//!
//! Provides the `run` command (execute a pipeline run from a config file)
//! and `steps` (print the step catalog).

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
