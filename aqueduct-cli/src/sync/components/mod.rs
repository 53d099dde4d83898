//! One syncer per component kind
//!
//! Every syncer follows the same per-item state machine: filter, resolve
//! dependencies, remap cross-references, scrub, locate on the destination,
//! then create or diff-and-update. The shared tail of that machine lives in
//! `reconcile`.

mod applets;
mod applications;
mod assets;
mod dashboards;
mod groups;
mod keystore;
mod membership;
mod packages;
mod plugins;
mod reports;
mod roles;
mod tasks;
mod users;
mod workflows;
mod workspaces;

pub use applets::Applets;
pub use applications::Applications;
pub use assets::Assets;
pub use dashboards::Dashboards;
pub use groups::Groups;
pub use keystore::KeyStore;
pub use packages::Packages;
pub use plugins::Plugins;
pub use reports::Reports;
pub use roles::Roles;
pub use tasks::Tasks;
pub use users::Users;
pub use workflows::Workflows;
pub use workspaces::Workspaces;

use async_trait::async_trait;

use super::context::SyncContext;
use super::diff::entity_is_different;
use super::error::{SyncError, SyncResult};
use super::identity::Identity;
use super::scrub::scrub_entity_keeping;
use crate::api::{Entity, Kind};

#[async_trait]
pub trait ComponentSyncer: Send + Sync {
    fn kind(&self) -> Kind;

    /// Reconcile every record of this kind from source to destination
    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()>;
}

/// The syncer driving a top-level component, if the kind has one
pub fn syncer_for(kind: Kind) -> Option<Box<dyn ComponentSyncer>> {
    let syncer: Box<dyn ComponentSyncer> = match kind {
        Kind::KeyStore => Box::new(KeyStore),
        Kind::Package => Box::new(Packages),
        Kind::Plugin => Box::new(Plugins),
        Kind::Asset => Box::new(Assets),
        Kind::Workspace => Box::new(Workspaces),
        Kind::Applet => Box::new(Applets),
        Kind::Application => Box::new(Applications),
        Kind::Task => Box::new(Tasks),
        Kind::Report => Box::new(Reports),
        Kind::Dashboard => Box::new(Dashboards),
        Kind::User => Box::new(Users),
        Kind::Group => Box::new(Groups),
        Kind::Role => Box::new(Roles),
        // Workflows are reconciled with their owning application
        Kind::Workflow => return None,
    };
    Some(syncer)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    /// Created; carries the new record in a live run
    Created(Option<Entity>),
    Updated,
    Unchanged,
    /// Differs, but updates of this kind are switched off
    Held,
}

/// Record the destination id of a source record that already exists there.
///
/// Nothing is written. Unknown or dangling source ids are left unresolved.
pub(crate) async fn link_existing(ctx: &mut SyncContext, kind: Kind, source_id: &str) -> SyncResult<()> {
    if ctx.state.resolved_id(kind, source_id).is_some() {
        return Ok(());
    }
    let Some(record) = ctx.source_by_id(kind, source_id).await? else {
        log::debug!("{} '{}' referenced from another record does not exist on source", kind, source_id);
        return Ok(());
    };
    let identity = Identity::of(kind, &record)?;
    if let Some(found) = ctx.find_on_destination(kind, &identity).await? {
        if let Some(destination_id) = found.id() {
            ctx.state.map_entity_id(kind, source_id, destination_id);
        }
    }
    Ok(())
}

/// Keys that carry meaning for a kind even though the scrubber normally drops them
fn preserved_keys(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Role => &["permissions"],
        _ => &[],
    }
}

/// Create the payload when absent; otherwise compare and update when it differs.
///
/// `payload` must already be remapped. It is scrubbed here, as is the
/// destination record it is compared against. Records the source-to-destination
/// id mapping whenever both ids are known.
pub(crate) async fn reconcile(
    ctx: &mut SyncContext,
    kind: Kind,
    name: &str,
    source_id: Option<&str>,
    mut payload: Entity,
    existing: Option<Entity>,
) -> SyncResult<Outcome> {
    scrub_entity_keeping(&mut payload, preserved_keys(kind));

    let Some(mut current) = existing else {
        let created = ctx.create(kind, name, source_id, &payload).await?;
        return Ok(Outcome::Created(created));
    };

    let Some(destination_id) = current.id().map(str::to_string) else {
        return Err(SyncError::access(kind, name, "/id"));
    };
    if let Some(source_id) = source_id {
        ctx.state.map_entity_id(kind, source_id, destination_id.clone());
    }

    scrub_entity_keeping(&mut current, preserved_keys(kind));
    if !entity_is_different(&payload, &current) {
        ctx.state.output(format!(
            "{} '{}' is already up to date on destination.",
            kind, name
        ));
        return Ok(Outcome::Unchanged);
    }
    if !ctx.state.options.updates_enabled(kind) {
        ctx.state.output(format!(
            "{} '{}' differs on destination but updating {} is disabled; leaving it.",
            kind,
            name,
            kind.collection()
        ));
        return Ok(Outcome::Held);
    }

    payload.insert("id", destination_id.clone());
    ctx.update(kind, name, &destination_id, &payload).await?;
    Ok(Outcome::Updated)
}
