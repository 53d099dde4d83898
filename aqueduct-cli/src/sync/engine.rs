//! Migration orchestrator
//!
//! Runs the component syncers in dependency order over one shared context:
//! everything a later kind may reference (keys, packages, plugins, assets,
//! workspaces, applications) is reconciled before the kinds that reference it.

use std::sync::Arc;

use chrono::{DateTime, Local};
use semver::Version;

use super::components::syncer_for;
use super::context::SyncContext;
use super::error::{SyncError, SyncResult};
use super::report::RunReport;
use super::state::{Filters, RunOptions};
use crate::api::{Instance, Kind};

/// Destination versions with known problems, and what goes wrong on them
const VERSION_CAVEATS: [(&str, &str); 1] = [(
    "10.5.0",
    "updating default reports is unreliable on this version; consider disabling update_default_reports",
)];

/// Lenient semver parse: `10.5` becomes `10.5.0`, build suffixes like `10.5.2.1234` are dropped
fn parse_version(raw: &str) -> Option<Version> {
    let numeric: String = raw
        .trim()
        .trim_start_matches('v')
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<u64> = numeric
        .split('.')
        .filter(|p| !p.is_empty())
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if parts.is_empty() {
        return None;
    }
    parts.resize(3, 0);
    Some(Version::new(parts[0], parts[1], parts[2]))
}

pub struct Migration {
    ctx: SyncContext,
    started_at: DateTime<Local>,
}

impl Migration {
    pub fn new(
        source: Arc<dyn Instance>,
        destination: Arc<dyn Instance>,
        options: RunOptions,
        filters: Filters,
    ) -> Self {
        Self {
            ctx: SyncContext::new(source, destination, options, filters),
            started_at: Local::now(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &super::state::RunState {
        &self.ctx.state
    }

    /// Refuse to migrate between incompatible product versions.
    ///
    /// A newer source is always refused. Otherwise differing versions are only
    /// accepted when `allow_unsupported` is set and `confirm` agrees.
    pub async fn check_versions(
        &mut self,
        allow_unsupported: bool,
        confirm: impl FnOnce(&str) -> bool,
    ) -> SyncResult<()> {
        let source_version = self.ctx.source.product_version().await.map_err(|source| {
            SyncError::Version {
                host: self.ctx.source_host().to_string(),
                source,
            }
        })?;
        let destination_version =
            self.ctx
                .destination
                .product_version()
                .await
                .map_err(|source| SyncError::Version {
                    host: self.ctx.destination_host().to_string(),
                    source,
                })?;
        log::info!(
            "Source '{}' runs {}, destination '{}' runs {}",
            self.ctx.source_host(),
            source_version,
            self.ctx.destination_host(),
            destination_version
        );

        let mismatch = || SyncError::VersionMismatch {
            source_version: source_version.clone(),
            destination_version: destination_version.clone(),
        };
        let (source_parsed, destination_parsed) =
            (parse_version(&source_version), parse_version(&destination_version));
        let same = match (&source_parsed, &destination_parsed) {
            (Some(source), Some(destination)) => {
                if source > destination {
                    return Err(mismatch());
                }
                source == destination
            }
            _ => source_version.trim() == destination_version.trim(),
        };

        if !same {
            if !allow_unsupported {
                return Err(mismatch());
            }
            let prompt = format!(
                "Source runs {} but destination runs {}. Migrating between different versions is unsupported. Continue?",
                source_version, destination_version
            );
            if !confirm(&prompt) {
                return Err(mismatch());
            }
            log::warn!(
                "Continuing with unsupported migration from {} to {}",
                source_version,
                destination_version
            );
        }

        if let Some(destination) = destination_parsed {
            for (version, caveat) in VERSION_CAVEATS {
                if parse_version(version).as_ref() == Some(&destination)
                    && self.ctx.state.options.update_default_reports
                {
                    log::warn!("WARNING: destination runs {}: {}", version, caveat);
                }
            }
        }
        Ok(())
    }

    /// Sync the selected components, or every component when none are selected.
    ///
    /// Stops at the first fatal error; whatever was recorded until then stays
    /// available through `report`.
    pub async fn run(&mut self, components: &[Kind]) -> SyncResult<()> {
        let mode = if self.ctx.is_dry_run() { "Dry run" } else { "Run" };
        self.ctx.state.output(format!(
            "{} started: migrating from '{}' to '{}'.",
            mode,
            self.ctx.source_host(),
            self.ctx.destination_host()
        ));

        for kind in Kind::ALL {
            if !components.is_empty() && !components.contains(&kind) {
                continue;
            }
            let Some(syncer) = syncer_for(kind) else {
                log::debug!("{} has no standalone syncer; it follows its owner", kind);
                continue;
            };
            log::debug!("Syncing {}", syncer.kind().collection());
            if let Err(err) = syncer.sync(&mut self.ctx).await {
                log::error!("{}", err);
                self.ctx
                    .state
                    .output(format!("Migration stopped: {}", err));
                return Err(err);
            }
        }

        self.ctx.state.output(format!("{} completed.", mode));
        Ok(())
    }

    pub fn report(&self) -> RunReport {
        RunReport::new(
            self.ctx.source_host(),
            self.ctx.destination_host(),
            &self.ctx.state,
            self.started_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::sync::testing::{Call, MemoryInstance, dry_run, live};

    fn migration(
        source: &Arc<MemoryInstance>,
        destination: &Arc<MemoryInstance>,
        options: RunOptions,
    ) -> Migration {
        let source: Arc<dyn Instance> = source.clone();
        let destination: Arc<dyn Instance> = destination.clone();
        Migration::new(source, destination, options, Filters::new())
    }

    fn seed_source(source: &MemoryInstance) {
        source.seed(Kind::Asset, json!({"id": "as1", "name": "vt"}));
        source.seed(
            Kind::Application,
            json!({
                "id": "A",
                "name": "Phishing",
                "trackingFieldId": "trk-src",
                "fields": [
                    {"id": "trk-src", "key": "tracking-id", "fieldType": "tracking"},
                    {"id": "f1", "key": "subject", "fieldType": "text"}
                ]
            }),
        );
        source.seed(
            Kind::Task,
            json!({
                "id": "t1",
                "uid": "uid-t1",
                "name": "Enrich",
                "applicationId": "A",
                "action": {"type": "python3", "script": "pass", "assetId": "as1"},
                "inputMapping": [{"value": "trk-src"}]
            }),
        );
        source.seed(Kind::Report, json!({"id": "r1", "name": "Open", "applicationIds": ["A"], "columns": ["trk-src"]}));
        source.seed(
            Kind::Dashboard,
            json!({"id": "d1", "uid": "uid-d1", "name": "SOC", "items": [{"reportId": "r1"}]}),
        );
        source.seed(Kind::Role, json!({"id": "ro1", "name": "Analyst", "permissions": {"apps": ["read"]}}));
        source.seed(Kind::Group, json!({"id": "g1", "name": "Tier 1", "roles": [{"id": "ro1", "name": "Analyst"}]}));
        source.seed(
            Kind::User,
            json!({
                "id": "u1",
                "userName": "jdoe",
                "displayName": "Jane Doe",
                "roles": [{"id": "ro1", "name": "Analyst"}],
                "groups": [{"id": "g1", "name": "Tier 1"}]
            }),
        );
    }

    #[tokio::test]
    async fn test_full_run_then_rerun_changes_nothing() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        seed_source(&source);

        let mut first = migration(&source, &destination, live());
        first.run(&[]).await.unwrap();
        assert_eq!(first.state().diff_log().len(), 8);

        let task = destination.find(Kind::Task, "Enrich").unwrap();
        let app = destination.find(Kind::Application, "Phishing").unwrap();
        assert_eq!(task.pointer_str("/inputMapping/0/value"), app.str("trackingFieldId"));

        destination.clear_calls();
        let mut second = migration(&source, &destination, live());
        second.run(&[]).await.unwrap();
        assert!(second.state().diff_log().is_empty());
        assert!(destination.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_records_what_a_live_run_does() {
        let source = Arc::new(MemoryInstance::source());
        seed_source(&source);

        let untouched = Arc::new(MemoryInstance::destination());
        let mut dry = migration(&source, &untouched, dry_run());
        dry.run(&[]).await.unwrap();
        assert!(untouched.calls().is_empty());

        let destination = Arc::new(MemoryInstance::destination());
        let mut real = migration(&source, &destination, live());
        real.run(&[]).await.unwrap();

        assert_eq!(dry.state().diff_log(), real.state().diff_log());
    }

    #[tokio::test]
    async fn test_selected_components_only() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        seed_source(&source);

        let mut migration = migration(&source, &destination, live());
        migration.run(&[Kind::Role]).await.unwrap();
        let kinds: Vec<Kind> = destination.calls().iter().map(Call::kind).collect();
        assert_eq!(kinds, vec![Kind::Role]);
    }

    #[tokio::test]
    async fn test_newer_source_is_refused() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.set_version("10.6.0");
        destination.set_version("10.5.2");

        let mut migration = migration(&source, &destination, live());
        let err = migration.check_versions(true, |_| true).await.unwrap_err();
        assert!(matches!(err, SyncError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_older_source_needs_permission_and_confirmation() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.set_version("10.4");
        destination.set_version("10.5.2.1187");

        let mut migration = migration(&source, &destination, live());
        assert!(migration.check_versions(false, |_| true).await.is_err());
        assert!(migration.check_versions(true, |_| false).await.is_err());
        assert!(migration.check_versions(true, |_| true).await.is_ok());
    }

    #[test]
    fn test_versions_are_padded_and_truncated() {
        assert_eq!(parse_version("10.5"), Some(Version::new(10, 5, 0)));
        assert_eq!(parse_version("10.5.2.1187"), Some(Version::new(10, 5, 2)));
        assert_eq!(parse_version("v10.4.1-rc1"), Some(Version::new(10, 4, 1)));
        assert_eq!(parse_version("unknown"), None);
    }
}
