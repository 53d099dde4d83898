//! Integration tasks
//!
//! The most dependency-heavy component: a task may need its plugin installed,
//! its asset and application present, and then every plugin and tracking-field
//! id inside it rewritten before it can be compared or created.

use async_trait::async_trait;
use serde_json::Value;

use super::{Applications, Assets, ComponentSyncer, Plugins, reconcile};
use crate::api::{Entity, Kind, TaskAction, TaskView};
use crate::sync::context::SyncContext;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::identity::Identity;
use crate::sync::remap::{remap_plugin_ids, remap_tracking_ids};

pub struct Tasks;

/// The parts of a task view the syncer needs after it starts editing the task
struct TaskDeps {
    uid: String,
    plugin: Option<(String, String)>,
    asset_id: Option<String>,
    application_id: Option<String>,
}

impl TaskDeps {
    fn read(task: &Entity) -> SyncResult<Self> {
        let view = TaskView::parse(task)
            .map_err(|path| SyncError::access(Kind::Task, task.label(), path))?;
        let uid = view
            .uid
            .ok_or_else(|| SyncError::access(Kind::Task, view.name, "/uid"))?;
        let plugin = match view.action {
            TaskAction::Plugin {
                plugin_name,
                action_type,
            } => Some((plugin_name.to_string(), action_type.to_string())),
            TaskAction::Builtin(_) => None,
        };
        Ok(Self {
            uid: uid.to_string(),
            plugin,
            asset_id: view.asset_id.map(str::to_string),
            application_id: view.application_id.map(str::to_string),
        })
    }
}

impl Tasks {
    /// Install the plugin, asset and application a task needs and point the task at them
    async fn place_dependencies(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        task: &mut Entity,
        deps: &TaskDeps,
    ) -> SyncResult<()> {
        if let Some((plugin_name, _)) = &deps.plugin {
            Plugins.ensure(ctx, plugin_name).await?;
        }
        if let Some(asset_id) = &deps.asset_id {
            match Assets.resolve(ctx, asset_id).await? {
                Some(destination_asset) => {
                    task.set_pointer("/action/assetId", Value::String(destination_asset));
                }
                None => log::debug!(
                    "Destination asset for task '{}' is not known yet; keeping source asset id",
                    name
                ),
            }
        }
        if let Some(application_id) = &deps.application_id {
            if let Some(destination_app) = Applications.resolve(ctx, application_id).await? {
                task.insert("applicationId", destination_app);
            }
        }
        Ok(())
    }

    pub async fn sync_task(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Task, &name) {
            return Ok(());
        }
        let task = ctx.source_item(Kind::Task, listed).await?;
        let deps = TaskDeps::read(&task)?;
        let identity = Identity::Uid(deps.uid.clone());
        let key = identity.key();
        if !ctx.state.begin(Kind::Task, &key) {
            return Ok(());
        }
        let result = self.reconcile_task(ctx, &name, task, deps, &identity).await;
        ctx.state.finish(Kind::Task, &key, result.is_ok());
        result
    }

    async fn reconcile_task(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        mut task: Entity,
        deps: TaskDeps,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing task '{}'.", name));

        match self.place_dependencies(ctx, name, &mut task, &deps).await {
            Ok(()) => {}
            Err(err) if err.is_write_failure() => {
                log::warn!("Skipping task '{}': {}", name, err);
                ctx.state.output(format!(
                    "Skipping task '{}': a dependency could not be installed on destination.",
                    name
                ));
                ctx.state.add_homework(
                    Kind::Task,
                    format!(
                        "Task '{}' was not migrated because a dependency failed ({}); fix it and re-run.",
                        name, err
                    ),
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if let Some((plugin_name, action_type)) = &deps.plugin {
            let dry_run = ctx.is_dry_run();
            let inventory = ctx.plugin_inventory().await?;
            match remap_plugin_ids(&mut task, plugin_name, action_type, inventory) {
                Ok(()) => {}
                // The plugin is only recorded as to-be-installed in a dry run
                Err(err) if dry_run && err.is_lookup() => log::debug!("{}", err),
                Err(err) => return Err(err),
            }
        }
        let rewritten = remap_tracking_ids(&mut task, ctx.state.tracking_ids());
        if rewritten > 0 {
            log::debug!("Rewrote {} tracking-id references in task '{}'", rewritten, name);
        }

        let existing = ctx.find_on_destination(Kind::Task, identity).await?;
        if existing.is_none() {
            if let Some(other) = ctx.find_by_name_on_destination(Kind::Task, name).await? {
                ctx.state.output(format!(
                    "The source task '{}' has a different uid ({}) than the destination task ({}); leaving it.",
                    name,
                    deps.uid,
                    other.str("uid").unwrap_or("none")
                ));
                ctx.state.add_homework(
                    Kind::Task,
                    format!(
                        "Task '{}' exists on both instances with different uids; reconcile it by hand.",
                        name
                    ),
                );
                return Ok(());
            }
        }

        let source_id = task.id().map(str::to_string);
        match reconcile(ctx, Kind::Task, name, source_id.as_deref(), task, existing).await {
            Ok(_) => Ok(()),
            Err(SyncError::Add { source, .. }) => {
                log::warn!("Failed to add task '{}' to destination: {}", name, source);
                ctx.state
                    .output(format!("Failed to add task '{}' to destination.", name));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ComponentSyncer for Tasks {
    fn kind(&self) -> Kind {
        Kind::Task
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync tasks from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for task in ctx.list_source(Kind::Task).await? {
            match self.sync_task(ctx, &task).await {
                Ok(()) => {}
                Err(err) if err.is_lookup() => {
                    log::warn!("{}", err);
                    ctx.state
                        .output(format!("Skipping task '{}': {}", task.label(), err));
                }
                Err(err) => return Err(err),
            }
        }
        ctx.state.output("Completed syncing of tasks.");
        Ok(())
    }
}
