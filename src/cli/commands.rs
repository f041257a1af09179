//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - demo: mount a coordinator and drive it with rapid options changes
//! - config: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// reloadr - iteration-guarded asynchronous data loading
#[derive(Parser, Debug)]
#[command(name = "reloadr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Page through a simulated slow source, changing pages faster than they load
    Demo {
        /// Number of pages to request (overrides config)
        #[arg(short, long)]
        pages: Option<u32>,

        /// Page whose load fails (overrides config)
        #[arg(short, long)]
        fail: Option<u32>,

        /// Keep the state in a caller-owned store instead of the coordinator
        #[arg(long)]
        controlled: bool,
    },

    /// Print the resolved configuration as YAML
    Config,
}
