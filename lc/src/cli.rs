//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// launchcast - launch notification dispatcher
#[derive(Parser)]
#[command(
    name = "lc",
    about = "Rate-limited launch notification dispatcher",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the notification daemon until interrupted
    Run {
        /// Log messages instead of delivering them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the next due notification
    Next,

    /// List tracked events and their sent notifications
    Events,
}
