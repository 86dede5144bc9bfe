//! CLI module for the ansibleplay tool.
//!
//! This module provides the command-line interface for planning and
//! applying playbook runs.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
