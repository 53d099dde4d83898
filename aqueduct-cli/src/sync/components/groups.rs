use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::membership::link_members;
use super::{ComponentSyncer, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;

/// Groups, matched by name
pub struct Groups;

impl Groups {
    pub async fn sync_group(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Group, &name) {
            return Ok(());
        }
        let group = ctx.source_item(Kind::Group, listed).await?;
        let identity = Identity::of(Kind::Group, &group)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Group, &key) {
            return Ok(());
        }
        let result = self.reconcile_group(ctx, &name, group, &identity).await;
        ctx.state.finish(Kind::Group, &key, result.is_ok());
        result
    }

    pub fn sync_group_by_id<'a>(
        &'a self,
        ctx: &'a mut SyncContext,
        source_id: &'a str,
    ) -> BoxFuture<'a, SyncResult<()>> {
        async move {
            let group = ctx.source_by_id(Kind::Group, source_id).await?.ok_or_else(|| {
                SyncError::lookup(Kind::Group, source_id, "referenced group not found on source")
            })?;
            self.sync_group(ctx, &group).await
        }
        .boxed()
    }

    async fn reconcile_group(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut group: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing group '{}'.", name));
        link_members(ctx, Kind::Group, name, &mut group, "roles", Kind::Role).await?;
        link_members(ctx, Kind::Group, name, &mut group, "users", Kind::User).await?;

        let source_id = group.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Group, identity).await?;
        reconcile(ctx, Kind::Group, name, source_id.as_deref(), group, existing).await?;
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Groups {
    fn kind(&self) -> Kind {
        Kind::Group
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync groups from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for group in ctx.list_source(Kind::Group).await? {
            self.sync_group(ctx, &group).await?;
        }
        ctx.state.output("Completed syncing of groups.");
        Ok(())
    }
}
