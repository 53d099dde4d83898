//! Run configuration
//!
//! A TOML file describes both instances, the run switches and the name
//! filters. Secrets can instead come from the environment (a `.env` file is
//! loaded at start-up) or, on a terminal, from a prompt.

mod instance;

pub use instance::InstanceConfig;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::Kind;
use crate::sync::{Filters, RunOptions};

pub const CONFIG_FILE_NAME: &str = "aqueduct.toml";

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("aqueduct-output")
}

/// The `[run]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Only record what would change. On unless explicitly turned off.
    #[serde(default = "default_true")]
    pub dry_run: bool,
    pub offline: bool,
    pub update_reports: bool,
    pub update_dashboards: bool,
    pub update_default_reports: bool,
    pub allow_unsupported_version: bool,
    /// Components to sync; empty means all
    pub components: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            offline: false,
            update_reports: false,
            update_dashboards: false,
            update_default_reports: false,
            allow_unsupported_version: false,
            components: Vec::new(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: InstanceConfig,
    pub destination: InstanceConfig,
    pub run: RunConfig,
    /// Kind collection name (`tasks`) to the names to sync
    pub include: BTreeMap<String, Vec<String>>,
    /// Kind collection name to the names to leave alone
    pub exclude: BTreeMap<String, Vec<String>>,
}

fn parse_kind(name: &str) -> Result<Kind> {
    Kind::from_collection(name)
        .with_context(|| format!("Unknown component '{}'", name))
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration")
    }

    /// Candidate configuration files, most specific first
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = explicit {
            return vec![path.to_path_buf()];
        }
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("aqueduct").join("config.toml"));
        }
        paths
    }

    /// Load the first configuration file found, then apply environment secrets
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let candidates = Self::search_paths(explicit);
        let path = candidates
            .iter()
            .find(|p| p.exists())
            .with_context(|| match explicit {
                Some(path) => format!("Configuration file does not exist: {}", path.display()),
                None => format!(
                    "No configuration found; create ./{} or pass --config",
                    CONFIG_FILE_NAME
                ),
            })?;
        log::debug!("Loading configuration from {}", path.display());

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Fill secrets from `AQUEDUCT_{SOURCE,DESTINATION}_{PASSWORD,TOKEN}`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (prefix, instance) in [
            ("AQUEDUCT_SOURCE", &mut self.source),
            ("AQUEDUCT_DESTINATION", &mut self.destination),
        ] {
            if let Some(password) = lookup(&format!("{}_PASSWORD", prefix)) {
                instance.password = Some(password);
            }
            if let Some(token) = lookup(&format!("{}_TOKEN", prefix)) {
                instance.access_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let filters = self.filters()?;
        if filters.has_include() && filters.has_exclude() {
            anyhow::bail!(
                "Both include and exclude lists are configured; use only one of them per run"
            );
        }
        self.components()?;
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.run.dry_run,
            offline: self.run.offline,
            update_reports: self.run.update_reports,
            update_dashboards: self.run.update_dashboards,
            update_default_reports: self.run.update_default_reports,
        }
    }

    pub fn filters(&self) -> Result<Filters> {
        let mut filters = Filters::new();
        for (name, names) in &self.include {
            filters = filters.include(parse_kind(name)?, names.iter().cloned());
        }
        for (name, names) in &self.exclude {
            filters = filters.exclude(parse_kind(name)?, names.iter().cloned());
        }
        Ok(filters)
    }

    pub fn components(&self) -> Result<Vec<Kind>> {
        self.run
            .components
            .iter()
            .map(|name| parse_kind(name))
            .collect()
    }
}
