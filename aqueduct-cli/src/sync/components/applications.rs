//! Applications and the tracking-field translation they feed
//!
//! Every application has a tracking field whose id the destination generates
//! itself. The pair (source tracking id, destination tracking id) is recorded
//! here and consumed by tasks and reports later in the run.

use std::cmp::Reverse;
use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;

use super::{ComponentSyncer, Workflows, Workspaces};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::diff::entity_is_different;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;
use crate::sync::remap::{id_list, remap_field_columns, remap_id_list, retain_id_list};
use crate::sync::scrub::scrub_entity;

pub struct Applications;

fn field_type(field: &Value) -> Option<&str> {
    field.get("fieldType").and_then(|v| v.as_str())
}

fn is_tracking_field(field: &Value) -> bool {
    field_type(field).is_some_and(|t| t.eq_ignore_ascii_case("tracking"))
}

fn is_reference_field(field: &Value) -> bool {
    field_type(field).is_some_and(|t| t.eq_ignore_ascii_case("reference"))
}

fn fields(app: &Entity) -> &[Value] {
    app.get("fields")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn field_key(field: &Value) -> Option<&str> {
    field
        .get("key")
        .or_else(|| field.get("id"))
        .and_then(|v| v.as_str())
}

/// How many reference fields an application has
fn reference_count(app: &Entity) -> usize {
    fields(app).iter().filter(|f| is_reference_field(f)).count()
}

fn tracking_id(app: &Entity) -> Option<String> {
    app.str("trackingFieldId")
        .map(str::to_string)
        .or_else(|| {
            fields(app)
                .iter()
                .find(|f| is_tracking_field(f))
                .and_then(|f| f.get("id"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
}

/// Remove the tracking field; the destination generates its own
fn strip_tracking_field(app: &mut Entity) {
    app.remove("trackingFieldId");
    if let Some(Value::Array(fields)) = app.get_mut("fields") {
        fields.retain(|f| !is_tracking_field(f));
    }
}

impl Applications {
    /// Reconcile one application and its workflow.
    ///
    /// Returns the destination application id when it is known.
    pub async fn sync_application(
        &self,
        ctx: &mut SyncContext,
        listed: &Entity,
    ) -> SyncResult<Option<String>> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Application, &name) {
            return Ok(None);
        }
        let app = ctx.source_item(Kind::Application, listed).await?;
        let identity = Identity::of(Kind::Application, &app)?;
        let source_id = app
            .id()
            .map(str::to_string)
            .ok_or_else(|| SyncError::access(Kind::Application, name.clone(), "/id"))?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Application, &key) {
            return Ok(ctx.state.resolved_id(Kind::Application, &source_id));
        }
        let result = self
            .reconcile_application(ctx, &name, &source_id, app, &identity)
            .await;
        ctx.state.finish(Kind::Application, &key, result.is_ok());
        result
    }

    async fn reconcile_application(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        source_id: &str,
        app: Entity,
        identity: &Identity,
    ) -> SyncResult<Option<String>> {
        ctx.state.output(format!("Processing application '{}'.", name));
        let source_tracking = tracking_id(&app);

        let mut payload = app;
        self.place_workspaces(ctx, name, &mut payload).await?;
        strip_tracking_field(&mut payload);
        scrub_entity(&mut payload);
        self.remap_reference_targets(ctx, &mut payload);

        let destination_id = match ctx.find_on_destination(Kind::Application, identity).await? {
            None => {
                let created = ctx
                    .create(Kind::Application, name, Some(source_id), &payload)
                    .await?;
                match created {
                    Some(created) => {
                        if let (Some(src), Some(dst)) = (&source_tracking, created.str("trackingFieldId")) {
                            ctx.state.map_tracking_id(src.clone(), dst);
                        }
                        created.id().map(str::to_string)
                    }
                    None => None,
                }
            }
            Some(existing) => {
                let destination_id = existing
                    .id()
                    .map(str::to_string)
                    .ok_or_else(|| SyncError::access(Kind::Application, name, "/id"))?;
                self.link(ctx, source_id, source_tracking.as_deref(), &existing);
                self.merge_into_existing(ctx, name, &payload, existing).await?;
                Some(destination_id)
            }
        };

        Workflows
            .sync_workflow(ctx, name, source_id, destination_id.as_deref())
            .await?;
        Ok(destination_id)
    }

    /// Put the workspaces an application belongs to on the destination first,
    /// then point its `workspaces` list at their destination ids.
    ///
    /// A dry run keeps ids it could not translate; a live run drops them.
    async fn place_workspaces(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        payload: &mut Entity,
    ) -> SyncResult<()> {
        for workspace_id in id_list(payload, "workspaces") {
            if ctx.state.resolved_id(Kind::Workspace, &workspace_id).is_some() {
                continue;
            }
            let workspace = ctx
                .source_by_id(Kind::Workspace, &workspace_id)
                .await?
                .ok_or_else(|| {
                    SyncError::lookup(
                        Kind::Workspace,
                        workspace_id.clone(),
                        format!("workspace of application '{}' not found on source", name),
                    )
                })?;
            Workspaces.sync_workspace(ctx, &workspace).await?;
        }
        let state = &ctx.state;
        if ctx.is_dry_run() {
            remap_id_list(payload, "workspaces", |id| state.resolved_id(Kind::Workspace, id));
        } else {
            let dropped = retain_id_list(payload, "workspaces", |id| state.resolved_id(Kind::Workspace, id));
            if !dropped.is_empty() {
                log::warn!(
                    "Application '{}' loses {} workspace links that are not on destination",
                    name,
                    dropped.len()
                );
            }
        }
        Ok(())
    }

    /// Record id and tracking-id translations for an application that exists on both sides
    fn link(
        &self,
        ctx: &mut SyncContext,
        source_id: &str,
        source_tracking: Option<&str>,
        existing: &Entity,
    ) {
        if let Some(destination_id) = existing.id() {
            ctx.state
                .map_entity_id(Kind::Application, source_id, destination_id);
        }
        if let (Some(src), Some(dst)) = (source_tracking, existing.str("trackingFieldId")) {
            ctx.state.map_tracking_id(src, dst);
        }
    }

    /// Point reference fields at destination applications already known this run
    fn remap_reference_targets(&self, ctx: &SyncContext, payload: &mut Entity) {
        let Some(Value::Array(fields)) = payload.get_mut("fields") else {
            return;
        };
        for field in fields.iter_mut().filter(|f| is_reference_field(f)) {
            let mapped = field
                .get("targetId")
                .and_then(|v| v.as_str())
                .and_then(|target| ctx.state.resolved_id(Kind::Application, target));
            if let Some(mapped) = mapped {
                field["targetId"] = Value::String(mapped);
            }
        }
    }

    /// Add fields the destination lacks and take the source layout, leaving
    /// destination-only fields and the destination tracking field in place
    async fn merge_into_existing(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        payload: &Entity,
        existing: Entity,
    ) -> SyncResult<()> {
        let mut merged = existing.clone();
        let present: HashSet<String> = fields(&existing)
            .iter()
            .filter_map(field_key)
            .map(str::to_string)
            .collect();
        let missing: Vec<Value> = fields(payload)
            .iter()
            .filter(|f| field_key(f).is_some_and(|k| !present.contains(k)))
            .cloned()
            .collect();
        for field in &missing {
            log::debug!(
                "Adding field '{}' to application '{}'",
                field_key(field).unwrap_or_default(),
                name
            );
        }
        if !missing.is_empty() {
            match merged.get_mut("fields") {
                Some(Value::Array(fields)) => fields.extend(missing),
                _ => {
                    merged.insert("fields", Value::Array(missing));
                }
            }
        }
        if let Some(layout) = payload.get("layout") {
            merged.insert("layout", layout.clone());
        }

        if !entity_is_different(&merged, &existing) {
            ctx.state.output(format!(
                "Application '{}' is already up to date on destination.",
                name
            ));
            return Ok(());
        }
        let destination_id = existing
            .id()
            .ok_or_else(|| SyncError::access(Kind::Application, name, "/id"))?;
        ctx.update(Kind::Application, name, destination_id, &merged)
            .await
    }

    /// Make sure the application a source id refers to is on the destination,
    /// recording its id and tracking-id translations.
    pub async fn resolve(
        &self,
        ctx: &mut SyncContext,
        source_application_id: &str,
    ) -> SyncResult<Option<String>> {
        if let Some(id) = ctx
            .state
            .resolved_id(Kind::Application, source_application_id)
        {
            return Ok(Some(id));
        }
        let app = ctx
            .source_by_id(Kind::Application, source_application_id)
            .await?
            .ok_or_else(|| {
                SyncError::lookup(
                    Kind::Application,
                    source_application_id,
                    "referenced application not found on source",
                )
            })?;
        let identity = Identity::of(Kind::Application, &app)?;
        if let Some(existing) = ctx.find_on_destination(Kind::Application, &identity).await? {
            let source_tracking = tracking_id(&app);
            self.link(ctx, source_application_id, source_tracking.as_deref(), &existing);
            return Ok(existing.id().map(str::to_string));
        }
        self.sync_application(ctx, &app).await
    }

    /// Rewrite report-column tracking references inside the given destination applications
    async fn remap_tracking_columns(
        &self,
        ctx: &mut SyncContext,
        destination_ids: &[String],
    ) -> SyncResult<()> {
        for id in destination_ids {
            let Some(app) = ctx
                .destination
                .get(Kind::Application, id)
                .await
                .map_err(|e| SyncError::api(Kind::Application, "read", id.clone(), ctx.destination.host(), e))?
            else {
                continue;
            };
            let mut updated = app.clone();
            let rewritten = remap_field_columns(&mut updated, ctx.state.tracking_ids());
            if rewritten == 0 {
                continue;
            }
            let name = app.label();
            log::debug!(
                "Rewrote {} tracking column references in application '{}'",
                rewritten,
                name
            );
            ctx.update(Kind::Application, &name, id, &updated).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Applications {
    fn kind(&self) -> Kind {
        Kind::Application
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync applications from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        let mut apps = Vec::new();
        for listed in ctx.list_source(Kind::Application).await? {
            apps.push(ctx.source_item(Kind::Application, &listed).await?);
        }
        apps.sort_by_key(|app| Reverse(reference_count(app)));

        let mut processed = Vec::new();
        for app in &apps {
            if let Some(id) = self.sync_application(ctx, app).await? {
                processed.push(id);
            }
        }
        if !ctx.is_dry_run() {
            self.remap_tracking_columns(ctx, &processed).await?;
        }
        ctx.state.output("Completed syncing of applications.");
        Ok(())
    }
}
