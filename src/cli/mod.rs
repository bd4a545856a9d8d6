//! CLI module for cs-classify - command-line interface.

pub mod commands;

pub use commands::Cli;
