//! Command-line interface for fetchgrid.
//!
//! Provides operational commands for proxy registration, task creation
//! and inspection, single scheduling/execution passes, and the long-lived
//! runner.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
