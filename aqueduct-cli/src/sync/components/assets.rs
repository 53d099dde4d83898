use async_trait::async_trait;

use super::{ComponentSyncer, Outcome, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;

/// Assets (integration connection settings), matched by name
pub struct Assets;

impl Assets {
    pub async fn sync_asset(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Asset, &name) {
            return Ok(());
        }
        let asset = ctx.source_item(Kind::Asset, listed).await?;
        let identity = Identity::of(Kind::Asset, &asset)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Asset, &key) {
            return Ok(());
        }
        let result = self.reconcile_asset(ctx, &name, asset, &identity).await;
        ctx.state.finish(Kind::Asset, &key, result.is_ok());
        result
    }

    async fn reconcile_asset(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        asset: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing asset '{}'.", name));
        let source_id = asset.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Asset, identity).await?;
        let outcome = reconcile(ctx, Kind::Asset, name, source_id.as_deref(), asset, existing).await?;
        if let Outcome::Created(_) = outcome {
            ctx.state.add_homework(
                Kind::Asset,
                format!(
                    "Asset '{}' was added to the destination without its secrets; re-enter its passwords and keys.",
                    name
                ),
            );
        }
        Ok(())
    }

    /// Make sure the asset a source id refers to exists on the destination.
    ///
    /// Returns the destination id, or `None` when it cannot be known yet
    /// (dry run, or the asset is filtered out).
    pub async fn resolve(
        &self,
        ctx: &mut SyncContext,
        source_asset_id: &str,
    ) -> SyncResult<Option<String>> {
        if let Some(id) = ctx.state.resolved_id(Kind::Asset, source_asset_id) {
            return Ok(Some(id));
        }
        let asset = ctx
            .source_by_id(Kind::Asset, source_asset_id)
            .await?
            .ok_or_else(|| {
                SyncError::lookup(Kind::Asset, source_asset_id, "referenced asset not found on source")
            })?;
        self.sync_asset(ctx, &asset).await?;
        Ok(ctx.state.resolved_id(Kind::Asset, source_asset_id))
    }
}

#[async_trait]
impl ComponentSyncer for Assets {
    fn kind(&self) -> Kind {
        Kind::Asset
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync assets from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for asset in ctx.list_source(Kind::Asset).await? {
            self.sync_asset(ctx, &asset).await?;
        }
        ctx.state.output("Completed syncing of assets.");
        Ok(())
    }
}
