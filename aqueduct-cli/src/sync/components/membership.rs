//! Membership links between users, groups and roles

use super::{Groups, Roles, link_existing};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::remap::{membership_ids, remap_membership};

/// Sync a referenced group or role by its source id
async fn ensure(ctx: &mut SyncContext, kind: Kind, source_id: &str) -> SyncResult<()> {
    match kind {
        Kind::Role => Roles.sync_role_by_id(ctx, source_id).await,
        Kind::Group => Groups.sync_group_by_id(ctx, source_id).await,
        _ => link_existing(ctx, kind, source_id).await,
    }
}

/// Rewrite the membership list under `key` to destination ids.
///
/// Groups and roles are synced first; users are only linked when they already
/// exist. In a live run, references that still have no destination id are
/// dropped (users quietly, since the user record carries the link too). In a
/// dry run they are kept as source ids.
pub(crate) async fn link_members(
    ctx: &mut SyncContext,
    owner_kind: Kind,
    owner_name: &str,
    entity: &mut Entity,
    key: &str,
    member_kind: Kind,
) -> SyncResult<()> {
    for (source_id, _) in membership_ids(entity, key) {
        match ensure(ctx, member_kind, &source_id).await {
            Ok(()) => {}
            Err(err) if err.is_lookup() => log::warn!("{}", err),
            Err(err) => return Err(err),
        }
        // a cyclic reference returns before it is created; it may still exist already
        link_existing(ctx, member_kind, &source_id).await?;
    }

    let state = &ctx.state;
    if ctx.is_dry_run() {
        remap_membership(entity, key, |id| {
            Some(state.resolved_id(member_kind, id).unwrap_or_else(|| id.to_string()))
        });
        return Ok(());
    }
    let dropped = remap_membership(entity, key, |id| state.resolved_id(member_kind, id));
    for member in dropped {
        if member_kind == Kind::User {
            log::debug!(
                "{} '{}' lists user '{}' who is not on destination yet",
                owner_kind,
                owner_name,
                member
            );
            continue;
        }
        ctx.state.add_homework(
            owner_kind,
            format!(
                "The {} '{}' could not be linked to {} '{}' which was not on destination yet; re-run to link them.",
                owner_kind, owner_name, member_kind, member
            ),
        );
    }
    Ok(())
}
