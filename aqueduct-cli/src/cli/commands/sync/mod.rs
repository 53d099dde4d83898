//! `aqueduct sync`

mod handler;

pub use handler::handle_sync_command;

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;

#[derive(Args, Debug, Clone, Default)]
pub struct SyncCommands {
    /// Apply changes to the destination (without this the run is a dry run)
    #[arg(long)]
    pub apply: bool,

    /// Transfer plugin bundles and package wheels from the source instead of a package index
    #[arg(long)]
    pub offline: bool,

    /// Only sync these components (repeatable or comma-separated, e.g. tasks,reports)
    #[arg(long = "component", value_delimiter = ',')]
    pub components: Vec<String>,

    /// Where to write diff_log.json, homework.txt and output.log
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Allow migrating between differing product versions after confirmation
    #[arg(long)]
    pub allow_unsupported_version: bool,

    /// Do not ask before applying changes
    #[arg(short, long)]
    pub yes: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl SyncCommands {
    /// Command-line flags override the configuration file
    pub fn apply_to(&self, config: &mut Config) {
        if self.apply {
            config.run.dry_run = false;
        }
        if self.offline {
            config.run.offline = true;
        }
        if !self.components.is_empty() {
            config.run.components = self.components.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.run.output_dir = dir.clone();
        }
        if self.allow_unsupported_version {
            config.run.allow_unsupported_version = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Kind;

    #[test]
    fn test_flags_override_file_values() {
        let mut config = Config::default();
        assert!(config.run.dry_run);
        let args = SyncCommands {
            apply: true,
            components: vec!["roles".into(), "groups".into()],
            output_dir: Some(PathBuf::from("/tmp/run")),
            ..SyncCommands::default()
        };
        args.apply_to(&mut config);
        assert!(!config.run.dry_run);
        assert_eq!(config.components().unwrap(), vec![Kind::Role, Kind::Group]);
        assert_eq!(config.run.output_dir, PathBuf::from("/tmp/run"));
    }
}
