//! Tooling
//!
//! Command-line interface over the sync core.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, Commands, OutputFormat};
