use async_trait::async_trait;

use super::ComponentSyncer;
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;
use crate::sync::state::DiffAction;

/// Installed plugin bundles, matched by name.
///
/// A missing plugin is downloaded from the source and uploaded to the
/// destination; a plugin at a different version is upgraded. Either way the
/// destination assigns new file and action ids, so the cached plugin
/// inventory is dropped afterwards.
pub struct Plugins;

impl Plugins {
    pub async fn sync_plugin(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Plugin, &name) {
            return Ok(());
        }
        let identity = Identity::of(Kind::Plugin, listed)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Plugin, &key) {
            return Ok(());
        }
        let result = self.transfer(ctx, listed, &name, &identity).await;
        ctx.state.finish(Kind::Plugin, &key, result.is_ok());
        result
    }

    async fn transfer(
        &self,
        ctx: &mut SyncContext,
        listed: &Entity,
        name: &str,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing plugin '{}'.", name));
        let plugin = ctx.source_item(Kind::Plugin, listed).await?;
        let action = match ctx.find_on_destination(Kind::Plugin, identity).await? {
            None => DiffAction::Added,
            Some(installed) if installed.str("version") != plugin.str("version") => {
                log::debug!(
                    "Plugin '{}' is at version {:?} on destination, {:?} on source",
                    name,
                    installed.str("version"),
                    plugin.str("version")
                );
                DiffAction::Updated
            }
            Some(_) => {
                ctx.state.output(format!(
                    "Plugin '{}' is already installed on destination at the same version.",
                    name
                ));
                return Ok(());
            }
        };

        if ctx.is_dry_run() {
            ctx.state.record_diff(Kind::Plugin, name, action);
            ctx.state.output(format!(
                "Dry run: plugin '{}' would be {} on destination.",
                name,
                match action {
                    DiffAction::Added => "installed",
                    DiffAction::Updated => "upgraded",
                }
            ));
            return Ok(());
        }

        let file_id = plugin
            .str("fileId")
            .ok_or_else(|| SyncError::access(Kind::Plugin, name, "/fileId"))?;
        let bundle = ctx.source.download_plugin(file_id).await.map_err(|e| {
            SyncError::api(Kind::Plugin, "download", name, ctx.source.host(), e)
        })?;
        let filename = plugin
            .str("fileName")
            .map(str::to_string)
            .unwrap_or_else(|| name.to_string());

        match action {
            DiffAction::Added => {
                ctx.state
                    .output(format!("Uploading plugin '{}' to destination.", name));
                ctx.destination
                    .upload_plugin(&filename, bundle)
                    .await
                    .map_err(|source| SyncError::Add {
                        kind: Kind::Plugin,
                        name: name.to_string(),
                        source,
                    })?;
            }
            DiffAction::Updated => {
                ctx.state
                    .output(format!("Upgrading plugin '{}' on destination.", name));
                ctx.destination
                    .upgrade_plugin(&filename, bundle)
                    .await
                    .map_err(|source| SyncError::Update {
                        kind: Kind::Plugin,
                        name: name.to_string(),
                        source,
                    })?;
            }
        }
        ctx.invalidate_plugin_inventory();
        ctx.state.record_diff(Kind::Plugin, name, action);
        ctx.state.output(format!(
            "Successfully transferred plugin '{}' to destination.",
            name
        ));
        Ok(())
    }

    /// Make sure a plugin a task depends on is installed on the destination
    pub async fn ensure(&self, ctx: &mut SyncContext, plugin_name: &str) -> SyncResult<()> {
        if ctx.plugin_inventory().await?.contains_plugin(plugin_name) {
            return Ok(());
        }
        let listed = ctx
            .list_source(Kind::Plugin)
            .await?
            .into_iter()
            .find(|p| p.str("name") == Some(plugin_name))
            .ok_or_else(|| {
                SyncError::lookup(Kind::Plugin, plugin_name, "plugin not found on source")
            })?;
        self.sync_plugin(ctx, &listed).await
    }
}

#[async_trait]
impl ComponentSyncer for Plugins {
    fn kind(&self) -> Kind {
        Kind::Plugin
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync plugins from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for plugin in ctx.list_source(Kind::Plugin).await? {
            self.sync_plugin(ctx, &plugin).await?;
        }
        ctx.state.output("Completed syncing of plugins.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::sync::testing::{Call, MemoryInstance, bundle, context, live};

    fn plugin(version: &str) -> Value {
        json!({
            "name": "sw_virus_total",
            "version": version,
            "fileId": "src-file-vt",
            "fileName": "sw_virus_total.swimbundle",
            "availableActionDescriptors": [{"actionType": "GetAnalyses", "id": "A0", "imageId": "I0"}]
        })
    }

    #[tokio::test]
    async fn test_missing_plugin_is_uploaded_and_inventory_refreshed() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Plugin, plugin("1.0.0"));
        source.seed_file("src-file-vt", bundle(&plugin("1.0.0")));

        let mut ctx = context(&source, &destination, live());
        assert!(!ctx.plugin_inventory().await.unwrap().contains_plugin("sw_virus_total"));
        Plugins.sync(&mut ctx).await.unwrap();

        assert_eq!(
            destination.calls(),
            vec![Call::UploadPlugin("sw_virus_total.swimbundle".into())]
        );
        let inventory = ctx.plugin_inventory().await.unwrap();
        let resolved = inventory.lookup("sw_virus_total", "GetAnalyses").unwrap();
        assert_ne!(resolved.image_id, "I0");
    }

    #[tokio::test]
    async fn test_version_difference_triggers_upgrade() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Plugin, plugin("2.0.0"));
        source.seed_file("src-file-vt", bundle(&plugin("2.0.0")));
        destination.seed(Kind::Plugin, plugin("1.0.0"));

        let mut ctx = context(&source, &destination, live());
        Plugins.sync(&mut ctx).await.unwrap();

        assert!(matches!(destination.calls().as_slice(), [Call::UpgradePlugin(_)]));
        assert_eq!(ctx.state.diff_log().get(Kind::Plugin, "sw_virus_total"), Some(DiffAction::Updated));
    }

    #[tokio::test]
    async fn test_rejected_bundle_is_not_recorded_as_installed() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        let listed = source.seed(Kind::Plugin, plugin("1.0.0"));
        source.seed_file("src-file-vt", b"not a bundle".to_vec());

        let mut ctx = context(&source, &destination, live());
        let err = Plugins.sync_plugin(&mut ctx, &listed).await.unwrap_err();

        assert!(matches!(err, SyncError::Add { kind: Kind::Plugin, .. }));
        assert!(destination.records(Kind::Plugin).is_empty());
        assert!(ctx.state.diff_log().is_empty());
    }

    #[tokio::test]
    async fn test_same_version_is_left_alone() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Plugin, plugin("1.0.0"));
        destination.seed(Kind::Plugin, plugin("1.0.0"));

        let mut ctx = context(&source, &destination, live());
        Plugins.sync(&mut ctx).await.unwrap();
        assert!(destination.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_unknown_plugin_is_a_lookup_failure() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        let mut ctx = context(&source, &destination, live());
        let err = Plugins.ensure(&mut ctx, "sw_missing").await.unwrap_err();
        assert!(err.is_lookup());
    }
}
