//! Sync command handler

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use colored::*;

use super::SyncCommands;
use crate::api::Instance;
use crate::cli::commands::confirm;
use crate::config::Config;
use crate::sync::{Migration, RunReport, format_diff_log, format_homework};

pub async fn handle_sync_command(config_path: Option<&Path>, args: SyncCommands) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(config_path)?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    let options = config.run_options();
    let filters = config.filters()?;
    let components = config.components()?;

    println!(
        "{} {} {} {}",
        "Migrating".bold(),
        config.source.host.cyan(),
        "->".dimmed(),
        config.destination.host.cyan()
    );
    if options.dry_run {
        println!(
            "{}",
            "Dry run: nothing will be written. Pass --apply to make changes.".yellow()
        );
    } else if !args.yes
        && !confirm(&format!(
            "Apply changes to {}?",
            config.destination.host
        ))
    {
        println!("Aborted.");
        return Ok(());
    }

    let source: Arc<dyn Instance> = Arc::new(config.source.connect("source").await?);
    let destination: Arc<dyn Instance> =
        Arc::new(config.destination.connect("destination").await?);

    let mut migration = Migration::new(source, destination, options, filters);
    migration
        .check_versions(config.run.allow_unsupported_version, confirm)
        .await?;

    let outcome = migration.run(&components).await;
    let report = migration.report();
    finish(&report, &config.run.output_dir)?;

    outcome.context("Migration did not complete")?;
    println!("{}", "Migration complete.".green().bold());
    Ok(())
}

/// Write the report files and summarise the run on the console
fn finish(report: &RunReport, output_dir: &Path) -> Result<()> {
    let run_dir = output_dir.join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    let written = report.write_to(&run_dir)?;

    if report.dry_run {
        println!();
        println!("{}", format_diff_log(&report.diff_log));
    } else {
        println!(
            "{} {}",
            report.diff_log.len().to_string().bold(),
            "records added or updated".dimmed()
        );
    }
    if !report.homework.is_empty() {
        println!();
        println!("{}", format_homework(&report.homework));
    }

    println!();
    for path in written {
        println!("Wrote {}", path.display().to_string().cyan());
    }
    Ok(())
}
