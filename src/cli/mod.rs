//! CLI module for reloadr - command-line interface and subcommands.
//!
//! Provides the entry point for the coordinator demo and config inspection.

pub mod commands;

pub use commands::Cli;
