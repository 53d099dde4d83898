use async_trait::async_trait;

use super::membership::link_members;
use super::{ComponentSyncer, Outcome, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::identity::Identity;

/// User accounts, matched by login name.
///
/// The account the migration is running as is never written; it only gets a
/// homework entry.
pub struct Users;

fn login(user: &Entity) -> String {
    user.str("userName")
        .map(str::to_string)
        .unwrap_or_else(|| user.label())
}

impl Users {
    pub async fn sync_user(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = login(listed);
        if ctx.state.skip_if_excluded(Kind::User, &name) {
            return Ok(());
        }
        let user = ctx.source_item(Kind::User, listed).await?;
        if ctx.destination_session().await?.matches(&user) {
            ctx.state.add_homework(
                Kind::User,
                format!(
                    "User '{}' is the account running this migration and was not changed; review its roles and groups by hand.",
                    name
                ),
            );
            return Ok(());
        }
        let identity = Identity::of(Kind::User, &user)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::User, &key) {
            return Ok(());
        }
        let result = self.reconcile_user(ctx, &name, user, &identity).await;
        ctx.state.finish(Kind::User, &key, result.is_ok());
        result
    }

    async fn reconcile_user(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut user: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing user '{}'.", name));
        link_members(ctx, Kind::User, name, &mut user, "roles", Kind::Role).await?;
        link_members(ctx, Kind::User, name, &mut user, "groups", Kind::Group).await?;

        let source_id = user.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::User, identity).await?;
        let outcome = reconcile(ctx, Kind::User, name, source_id.as_deref(), user, existing).await?;
        if let Outcome::Created(_) = outcome {
            ctx.state.add_homework(
                Kind::User,
                format!(
                    "User '{}' was added to the destination without a password; set one or send an invite.",
                    name
                ),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Users {
    fn kind(&self) -> Kind {
        Kind::User
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync users from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for user in ctx.list_source(Kind::User).await? {
            self.sync_user(ctx, &user).await?;
        }
        ctx.state.output("Completed syncing of users.");
        Ok(())
    }
}
