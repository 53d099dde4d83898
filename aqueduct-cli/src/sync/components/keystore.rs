use async_trait::async_trait;

use super::ComponentSyncer;
use crate::api::{Entity, Kind};
use crate::sync::context::SyncContext;
use crate::sync::error::SyncResult;
use crate::sync::identity::Identity;

/// Keystore entries. Only key names are readable, so a missing key is
/// created empty and the operator is asked to fill in its value.
pub struct KeyStore;

impl KeyStore {
    pub async fn sync_credential(&self, ctx: &mut SyncContext, credential: &Entity) -> SyncResult<()> {
        let name = credential.label();
        if ctx.state.skip_if_excluded(Kind::KeyStore, &name) {
            return Ok(());
        }
        let identity = Identity::of(Kind::KeyStore, credential)?;
        if ctx
            .find_on_destination(Kind::KeyStore, &identity)
            .await?
            .is_some()
        {
            ctx.state.output(format!(
                "Keystore key '{}' already exists on destination.",
                name
            ));
            return Ok(());
        }

        let mut payload = Entity::new();
        payload.insert("name", name.clone());
        payload.insert("value", "");
        ctx.create(Kind::KeyStore, &name, None, &payload).await?;
        ctx.state.add_homework(
            Kind::KeyStore,
            format!("Set the value of keystore key '{}' on the destination.", name),
        );
        Ok(())
    }
}

#[async_trait]
impl ComponentSyncer for KeyStore {
    fn kind(&self) -> Kind {
        Kind::KeyStore
    }

    async fn sync(&self, ctx: &mut SyncContext) -> SyncResult<()> {
        ctx.state.output(format!(
            "Starting to sync keystore from '{}' to '{}'.",
            ctx.source_host(),
            ctx.destination_host()
        ));
        for credential in ctx.list_source(Kind::KeyStore).await? {
            self.sync_credential(ctx, &credential).await?;
        }
        ctx.state.output("Completed syncing of keystore.");
        Ok(())
    }
}
