use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::membership::link_members;
use super::{ComponentSyncer, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;

/// Roles, matched by name. A role's groups are synced before the role itself.
pub struct Roles;

impl Roles {
    pub async fn sync_role(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Role, &name) {
            return Ok(());
        }
        let role = ctx.source_item(Kind::Role, listed).await?;
        let identity = Identity::of(Kind::Role, &role)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Role, &key) {
            return Ok(());
        }
        let result = self.reconcile_role(ctx, &name, role, &identity).await;
        ctx.state.finish(Kind::Role, &key, result.is_ok());
        result
    }

    /// Sync the role a membership reference points at.
    ///
    /// Boxed since roles and groups may reference each other.
    pub fn sync_role_by_id<'a>(
        &'a self,
        ctx: &'a mut SyncContext,
        source_id: &'a str,
    ) -> BoxFuture<'a, SyncResult<()>> {
        async move {
            let role = ctx.source_by_id(Kind::Role, source_id).await?.ok_or_else(|| {
                SyncError::lookup(Kind::Role, source_id, "referenced role not found on source")
            })?;
            self.sync_role(ctx, &role).await
        }
        .boxed()
    }

    async fn reconcile_role(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut role: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing role '{}'.", name));
        link_members(ctx, Kind::Role, name, &mut role, "groups", Kind::Group).await?;
        link_members(ctx, Kind::Role, name, &mut role, "users", Kind::User).await?;

        let source_id = role.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Role, identity).await?;
        reconcile(ctx, Kind::Role, name, source_id.as_deref(), role, existing).await?;
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Roles {
    fn kind(&self) -> Kind {
        Kind::Role
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync roles from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for role in ctx.list_source(Kind::Role).await? {
            self.sync_role(ctx, &role).await?;
        }
        ctx.state.output("Completed syncing of roles.");
        Ok(())
    }
}
