//! Command-line interface

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::gather::GatherCommands;
use commands::sync::SyncCommands;

/// Migrate content between two platform instances
#[derive(Parser)]
#[command(name = "aqueduct")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./aqueduct.toml, then the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile destination content with the source
    Sync(SyncCommands),

    /// List source application names
    Gather(GatherCommands),
}
