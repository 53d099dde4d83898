use async_trait::async_trait;

use super::{ComponentSyncer, reconcile};
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::identity::Identity;

/// Applets (embeddable UI widgets), matched by name
pub struct Applets;

impl Applets {
    pub async fn sync_applet(&self, ctx: &mut SyncContext, listed: &Entity) -> SyncResult<()> {
        let name = listed.label();
        if ctx.state.skip_if_excluded(Kind::Applet, &name) {
            return Ok(());
        }
        let applet = ctx.source_item(Kind::Applet, listed).await?;
        let identity = Identity::of(Kind::Applet, &applet)?;
        let key = identity.key();
        if !ctx.state.begin(Kind::Applet, &key) {
            return Ok(());
        }
        let result = self.reconcile_applet(ctx, &name, applet, &identity).await;
        ctx.state.finish(Kind::Applet, &key, result.is_ok());
        result
    }

    async fn reconcile_applet(
        &self,
        ctx: &mut SyncContext,
        name: &str,
        applet: Entity,
        identity: &Identity,
    ) -> SyncResult<()> {
        ctx.state.output(format!("Processing applet '{}'.", name));
        let source_id = applet.id().map(str::to_string);
        let existing = ctx.find_on_destination(Kind::Applet, identity).await?;
        reconcile(ctx, Kind::Applet, name, source_id.as_deref(), applet, existing).await?;
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for Applets {
    fn kind(&self) -> Kind {
        Kind::Applet
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync applets from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for applet in ctx.list_source(Kind::Applet).await? {
            self.sync_applet(ctx, &applet).await?;
        }
        ctx.state.output("Completed syncing of applets.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::sync::state::DiffAction;
    use crate::sync::testing::{Call, MemoryInstance, context, live};

    #[tokio::test]
    async fn test_missing_applet_is_added_and_matching_one_left_alone() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Applet, json!({"name": "Timeline", "html": "<div/>", "modifiedDate": "x"}));
        source.seed(Kind::Applet, json!({"name": "Map", "html": "<svg/>"}));
        destination.seed(Kind::Applet, json!({"name": "Map", "html": "<svg/>", "modifiedDate": "y"}));

        let mut ctx = context(&source, &destination, live());
        Applets.sync(&mut ctx).await.unwrap();

        match destination.calls().as_slice() {
            [Call::Add(Kind::Applet, payload)] => {
                assert_eq!(payload.name(), Some("Timeline"));
                assert!(payload.get("modifiedDate").is_none());
            }
            other => panic!("unexpected calls: {:?}", other),
        }
        assert_eq!(ctx.state.diff_log().get(Kind::Applet, "Timeline"), Some(DiffAction::Added));
        assert_eq!(ctx.state.diff_log().get(Kind::Applet, "Map"), None);
    }

    #[tokio::test]
    async fn test_changed_applet_is_updated() {
        let source = Arc::new(MemoryInstance::source());
        let destination = Arc::new(MemoryInstance::destination());
        source.seed(Kind::Applet, json!({"name": "Map", "html": "<svg v2/>"}));
        let existing = destination.seed(Kind::Applet, json!({"name": "Map", "html": "<svg/>"}));

        let mut ctx = context(&source, &destination, live());
        Applets.sync(&mut ctx).await.unwrap();

        match destination.calls().as_slice() {
            [Call::Update(Kind::Applet, id, payload)] => {
                assert_eq!(Some(id.as_str()), existing.id());
                assert_eq!(payload.str("html"), Some("<svg v2/>"));
            }
            other => panic!("unexpected calls: {:?}", other),
        }
    }
}
