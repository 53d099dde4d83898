//! `aqueduct gather`: list the applications available on the source

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;

use crate::api::{Entity, Instance, Kind};
use crate::config::Config;

#[derive(Args, Debug, Clone, Default)]
pub struct GatherCommands {
    /// Print the names as a JSON array
    #[arg(long)]
    pub json: bool,
}

fn application_names(apps: &[Entity]) -> Vec<String> {
    let mut names: Vec<String> = apps.iter().filter_map(|a| a.name()).map(str::to_string).collect();
    names.sort_by_key(|name| name.to_lowercase());
    names.dedup();
    names
}

pub async fn handle_gather_command(config_path: Option<&Path>, args: GatherCommands) -> Result<()> {
    let config = Config::load(config_path)?;
    config
        .source
        .validate("source")
        .context("Invalid configuration")?;

    let source = config.source.connect("source").await?;
    let apps = source
        .list(Kind::Application)
        .await
        .with_context(|| format!("Failed to list applications on {}", source.host()))?;
    let names = application_names(&apps);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }
    println!(
        "{} applications on {}",
        names.len().to_string().bold(),
        source.host().cyan()
    );
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}
