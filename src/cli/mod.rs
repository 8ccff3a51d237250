//! Command-line interface for mlforge.
//!
//! Provides commands to run a pipeline, preview its plan, and list the
//! registered steps.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
