//! Workspaces: named groupings of applications and dashboards
//!
//! A workspace may list applications and dashboards that are not on the
//! destination yet. Those references are left out and the operator is asked
//! to re-run once they exist.

use async_trait::async_trait;

use super::{ComponentSyncer, link_existing, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::identity::Identity;
use crate::sync::remap::{id_list, retain_id_list};

/// Member lists of a workspace and the kind each one holds
const MEMBER_LISTS: [(&str, Kind); 2] = [
    ("applications", Kind::Application),
    ("dashboards", Kind::Dashboard),
];

pub struct Workspaces;

impl Workspaces {
    /// Reconcile one workspace, returning its destination id when known
    pub async fn sync_workspace(
        &self,
        ctx: &mut SyncContext,
        listed: &Entity,
    ) -> SyncResult<Option<String>> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Workspace, &name) {
            return Ok(None);
        }
        let workspace = ctx.source_item(Kind::Workspace, listed).await?;
        let identity = Identity::of(Kind::Workspace, &workspace)?;
        let source_id = workspace.id().map(str::to_string);
        let key = identity.key();
        if !ctx.state.begin(Kind::Workspace, &key) {
            return Ok(None);
        }
        let result = self
            .reconcile_workspace(ctx, &name, source_id.as_deref(), workspace, &identity)
            .await;
        ctx.state.finish(Kind::Workspace, &key, result.is_ok());
        result?;
        Ok(source_id.and_then(|id| ctx.state.resolved_id(Kind::Workspace, &id)))
    }

    async fn reconcile_workspace(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        source_id: Option<&str>,
        mut workspace: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing workspace '{}'.", name));
        for (list, kind) in MEMBER_LISTS {
            for member in id_list(&workspace, list) {
                link_existing(ctx, kind, &member).await?;
            }
            let state = &ctx.state;
            let dropped = retain_id_list(&mut workspace, list, |id| state.resolved_id(kind, id));
            if !dropped.is_empty() {
                log::debug!("Workspace '{}' left out {} {:?}", name, list, dropped);
                ctx.state.add_homework(
                    Kind::Workspace,
                    format!(
                        "Workspace '{}' is missing {} {} that are not on the destination yet; re-run once they are migrated.",
                        name,
                        dropped.len(),
                        list
                    ),
                );
            }
        }
        let existing = ctx.find_on_destination(Kind::Workspace, identity).await?;
        reconcile(ctx, Kind::Workspace, name, source_id, workspace, existing).await?;
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Workspaces {
    fn kind(&self) -> Kind {
        Kind::Workspace
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync workspaces from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for workspace in ctx.list_source(Kind::Workspace).await? {
            self.sync_workspace(ctx, &workspace).await?;
        }
        ctx.state.output("Completed syncing of workspaces.");
        Ok(())
    }
}
