//! aqueduct - migrate configuration content between platform instances
//!
//! Reads applications, workflows, tasks, plugins, packages, assets, reports,
//! dashboards, users, groups and roles from a source instance and reproduces
//! them on a destination instance, creating what is missing and updating
//! what differs.

use anyhow::Result;
use clap::Parser;

mod api;
mod cli;
mod config;
mod sync;

use cli::{Cli, Commands};

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "aqueduct=debug" } else { "aqueduct=info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Sync(args) => {
            cli::commands::sync::handle_sync_command(cli.config.as_deref(), args).await
        }
        Commands::Gather(args) => {
            cli::commands::gather::handle_gather_command(cli.config.as_deref(), args).await
        }
    }
}
