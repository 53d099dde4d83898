use serde_json::Value;

use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::diff::is_different;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::remap::remap_stage_parents;
use crate::sync::scrub::{scrub, scrub_entity};
use crate::sync::state::DiffAction;

/// Application workflows.
///
/// A workflow belongs to exactly one application and is reconciled as part of
/// it, so this syncer has no collection-level entry point.
pub struct Workflows;

impl Workflows {
    /// Reconcile the workflow of one application.
    ///
    /// `destination_application_id` is `None` when the application does not
    /// exist on the destination yet, which only happens in a dry run.
    pub async fn sync_workflow(
        &self,
        ctx: &mut SyncContext,
        application_name: &str,
        source_application_id: &str,
        destination_application_id: Option<&str>,
    ) -> SyncResult<()> {
        if ctx.state.skip_if_excluded(Kind::Workflow, application_name) {
            return Ok(());
        }
        let key = format!("application:{}", source_application_id);
        if !ctx.state.begin(Kind::Workflow, &key) {
            return Ok(());
        }
        let result = self
            .reconcile_workflow(
                ctx,
                application_name,
                source_application_id,
                destination_application_id,
            )
            .await;
        ctx.state.finish(Kind::Workflow, &key, result.is_ok());
        result
    }

    async fn reconcile_workflow(
        &self,
        ctx: &mut SyncContext,
        application_name: &str,
        source_application_id: &str,
        destination_application_id: Option<&str>,
    ) -> SyncResult<()> {
        let source_workflow = ctx
            .source
            .get_workflow(source_application_id)
            .await
            .map_err(|e| {
                SyncError::api(Kind::Workflow, "read", application_name, ctx.source.host(), e)
            })?;
        let Some(source_workflow) = source_workflow else {
            ctx.state.output(format!(
                "Application '{}' has no workflow on source.",
                application_name
            ));
            return Ok(());
        };

        let Some(destination_application_id) = destination_application_id else {
            if ctx.is_dry_run() {
                ctx.state
                    .record_diff(Kind::Workflow, application_name, DiffAction::Added);
                return Ok(());
            }
            return Err(SyncError::lookup(
                Kind::Application,
                application_name,
                "application is not on destination; cannot place its workflow",
            ));
        };

        let existing = ctx
            .destination
            .get_workflow(destination_application_id)
            .await
            .map_err(|e| {
                SyncError::api(Kind::Workflow, "read", application_name, ctx.destination.host(), e)
            })?;

        match existing {
            None => {
                let mut payload = source_workflow;
                scrub_entity(&mut payload);
                payload.insert("applicationId", destination_application_id);
                ctx.create(Kind::Workflow, application_name, None, &payload)
                    .await?;
            }
            Some(destination_workflow) => {
                self.update_stages(ctx, application_name, &source_workflow, destination_workflow)
                    .await?;
            }
        }
        Ok(())
    }

    /// Carry the source stages over, re-parenting top-level stages to the destination workflow
    async fn update_stages(
        &self,
        ctx: &mut SyncContext,
        application_name: &str,
        source_workflow: &Entity,
        destination_workflow: Entity,
    ) -> SyncResult<()> {
        let source_id = source_workflow
            .id()
            .ok_or_else(|| SyncError::access(Kind::Workflow, application_name, "/id"))?;
        let destination_id = destination_workflow
            .id()
            .map(str::to_string)
            .ok_or_else(|| SyncError::access(Kind::Workflow, application_name, "/id"))?;

        let mut stages = source_workflow
            .get("stages")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let reparented = remap_stage_parents(&mut stages, source_id, &destination_id);
        log::debug!(
            "Re-parented {} stages of workflow for application '{}'",
            reparented,
            application_name
        );
        scrub(&mut stages);

        let mut current_stages = destination_workflow
            .get("stages")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        scrub(&mut current_stages);

        if !is_different(&stages, &current_stages) {
            ctx.state.output(format!(
                "Workflow for application '{}' is already up to date on destination.",
                application_name
            ));
            return Ok(());
        }

        let mut payload = destination_workflow;
        payload.insert("stages", stages);
        ctx.update(Kind::Workflow, application_name, &destination_id, &payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sync::testing::{Call, MemoryInstance, context, dry_run, live};

    #[tokio::test]
    async fn test_existing_workflow_gets_reparented_stages() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(
            Kind::Workflow,
            json!({"id": "W", "applicationId": "A", "stages": [
                {"id": "s1", "parentId": "W", "name": "Triage"},
                {"id": "s2", "parentId": "s1", "name": "Escalate"}
            ]}),
        );
        destination.seed(
            Kind::Workflow,
            json!({"id": "W2", "applicationId": "DA", "stages": []}),
        );

        let mut ctx = context(&source, &destination, live());
        Workflows
            .sync_workflow(&mut ctx, "Phishing", "A", Some("DA"))
            .await
            .unwrap();

        match destination.calls().as_slice() {
            [Call::Update(Kind::Workflow, id, payload)] => {
                assert_eq!(id, "W2");
                assert_eq!(payload.pointer_str("/stages/0/parentId"), Some("W2"));
                assert_eq!(payload.pointer_str("/stages/1/parentId"), Some("s1"));
            }
            other => panic!("unexpected calls: {:?}", other),
        }

        destination.clear_calls();
        let mut again = context(&source, &destination, live());
        Workflows
            .sync_workflow(&mut again, "Phishing", "A", Some("DA"))
            .await
            .unwrap();
        assert!(destination.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_workflow_is_created_for_destination_application() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Workflow, json!({"id": "W", "applicationId": "A", "stages": []}));

        let mut ctx = context(&source, &destination, live());
        Workflows
            .sync_workflow(&mut ctx, "Phishing", "A", Some("DA"))
            .await
            .unwrap();

        let created = destination.records(Kind::Workflow);
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].str("applicationId"), Some("DA"));
    }

    #[tokio::test]
    async fn test_dry_run_without_destination_application_only_records() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Workflow, json!({"id": "W", "applicationId": "A", "stages": []}));

        let mut ctx = context(&source, &destination, dry_run());
        Workflows
            .sync_workflow(&mut ctx, "Phishing", "A", None)
            .await
            .unwrap();
        assert!(destination.calls().is_empty());
        assert!(!ctx.state.diff_log().is_empty());
    }
}
