//! Shared context threaded through every syncer
//!
//! Holds both instances, the run state, and the caches that are expensive to
//! rebuild: the destination plugin inventory and per-kind destination listings.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::{SyncError, SyncResult};
use super::identity::Identity;
use super::inventory::PluginInventory;
use super::state::{DiffAction, Filters, RunOptions, RunState};
use crate::api::{Entity, Instance, Kind, SessionIdentity};

pub struct SyncContext {
    pub source: Arc<dyn Instance>,
    pub destination: Arc<dyn Instance>,
    pub state: RunState,
    inventory: Option<PluginInventory>,
    destination_index: HashMap<Kind, Vec<Entity>>,
    session: Option<SessionIdentity>,
}

impl SyncContext {
    pub fn new(
        source: Arc<dyn Instance>,
        destination: Arc<dyn Instance>,
        options: RunOptions,
        filters: Filters,
    ) -> Self {
        Self {
            source,
            destination,
            state: RunState::new(options, filters),
            inventory: None,
            destination_index: HashMap::new(),
            session: None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.state.is_dry_run()
    }

    pub fn source_host(&self) -> &str {
        self.source.host()
    }

    pub fn destination_host(&self) -> &str {
        self.destination.host()
    }

    /// The destination plugin inventory, built on first use
    pub async fn plugin_inventory(&mut self) -> SyncResult<&PluginInventory> {
        if self.inventory.is_none() {
            let inventory = PluginInventory::build(self.destination.as_ref())
                .await
                .map_err(|e| {
                    SyncError::api(Kind::Plugin, "list", "*", self.destination.host(), e)
                })?;
            self.inventory = Some(inventory);
        }
        Ok(self.inventory.get_or_insert_with(PluginInventory::default))
    }

    /// Forget the inventory and plugin listing after a plugin install or upgrade
    pub fn invalidate_plugin_inventory(&mut self) {
        self.inventory = None;
        self.destination_index.remove(&Kind::Plugin);
    }

    /// The account the destination session is authenticated as
    pub async fn destination_session(&mut self) -> SyncResult<&SessionIdentity> {
        if self.session.is_none() {
            let session = self.destination.session_user().await.map_err(|e| {
                SyncError::api(Kind::User, "read session of", "*", self.destination.host(), e)
            })?;
            self.session = Some(session);
        }
        Ok(self.session.get_or_insert_with(SessionIdentity::default))
    }

    /// Every record of a kind on the source
    pub async fn list_source(&self, kind: Kind) -> SyncResult<Vec<Entity>> {
        self.source
            .list(kind)
            .await
            .map_err(|e| SyncError::api(kind, "list", "*", self.source.host(), e))
    }

    /// Full source record for an item from a (possibly light) listing
    pub async fn source_item(&self, kind: Kind, listed: &Entity) -> SyncResult<Entity> {
        let Some(id) = listed.id() else {
            return Ok(listed.clone());
        };
        self.source_by_id(kind, id)
            .await?
            .ok_or_else(|| SyncError::lookup(kind, listed.label(), "not found on source"))
    }

    pub async fn source_by_id(&self, kind: Kind, id: &str) -> SyncResult<Option<Entity>> {
        self.source
            .get(kind, id)
            .await
            .map_err(|e| SyncError::api(kind, "read", id, self.source.host(), e))
    }

    async fn destination_listing(&mut self, kind: Kind) -> SyncResult<&[Entity]> {
        if !self.destination_index.contains_key(&kind) {
            let listing = self
                .destination
                .list(kind)
                .await
                .map_err(|e| SyncError::api(kind, "list", "*", self.destination.host(), e))?;
            self.destination_index.insert(kind, listing);
        }
        Ok(self
            .destination_index
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    async fn destination_full(&self, kind: Kind, listed: Entity) -> SyncResult<Entity> {
        let Some(id) = listed.id().map(str::to_string) else {
            return Ok(listed);
        };
        let full = self
            .destination
            .get(kind, &id)
            .await
            .map_err(|e| SyncError::api(kind, "read", id.clone(), self.destination.host(), e))?;
        Ok(full.unwrap_or(listed))
    }

    /// Locate the destination counterpart of a source record by its identity
    pub async fn find_on_destination(
        &mut self,
        kind: Kind,
        identity: &Identity,
    ) -> SyncResult<Option<Entity>> {
        match identity {
            Identity::Id(source_id) => {
                let id = self
                    .state
                    .resolved_id(kind, source_id)
                    .unwrap_or_else(|| source_id.clone());
                self.destination
                    .get(kind, &id)
                    .await
                    .map_err(|e| SyncError::api(kind, "read", id.clone(), self.destination.host(), e))
            }
            Identity::Name(login) if kind == Kind::User => {
                let found = self.destination.search_user(login).await.map_err(|e| {
                    SyncError::api(kind, "search", login.clone(), self.destination.host(), e)
                })?;
                match found {
                    Some(user) => self.destination_full(kind, user).await.map(Some),
                    None => Ok(None),
                }
            }
            Identity::Owner(application_id) => self
                .destination
                .get_workflow(application_id)
                .await
                .map_err(|e| {
                    SyncError::api(kind, "read", application_id.clone(), self.destination.host(), e)
                }),
            _ => {
                let found = self
                    .destination_listing(kind)
                    .await?
                    .iter()
                    .find(|candidate| identity.matches(kind, candidate))
                    .cloned();
                match found {
                    Some(listed) => self.destination_full(kind, listed).await.map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    /// A destination record of the kind with this exact name, regardless of identity rules
    pub async fn find_by_name_on_destination(
        &mut self,
        kind: Kind,
        name: &str,
    ) -> SyncResult<Option<Entity>> {
        Ok(self
            .destination_listing(kind)
            .await?
            .iter()
            .find(|candidate| candidate.str("name") == Some(name))
            .cloned())
    }

    fn remember_destination(&mut self, kind: Kind, record: &Entity) {
        let Some(listing) = self.destination_index.get_mut(&kind) else {
            return;
        };
        match record
            .id()
            .and_then(|id| listing.iter().position(|e| e.id() == Some(id)))
        {
            Some(i) => listing[i] = record.clone(),
            None => listing.push(record.clone()),
        }
    }

    /// Create a record on the destination, or in a dry run only record that it would be.
    ///
    /// Returns the created record in a live run.
    pub async fn create(
        &mut self,
        kind: Kind,
        name: &str,
        source_id: Option<&str>,
        payload: &Entity,
    ) -> SyncResult<Option<Entity>> {
        if self.is_dry_run() {
            self.state.record_diff(kind, name, DiffAction::Added);
            self.state
                .output(format!("Dry run: {} '{}' would be added to destination.", kind, name));
            return Ok(None);
        }
        self.state
            .output(format!("Adding {} '{}' to destination.", kind, name));
        let created = self
            .destination
            .add(kind, payload)
            .await
            .map_err(|source| SyncError::Add {
                kind,
                name: name.to_string(),
                source,
            })?;
        if let (Some(source_id), Some(destination_id)) = (source_id, created.id()) {
            self.state.map_entity_id(kind, source_id, destination_id);
        }
        self.remember_destination(kind, &created);
        self.state.record_diff(kind, name, DiffAction::Added);
        self.state
            .output(format!("Successfully added {} '{}' to destination.", kind, name));
        Ok(Some(created))
    }

    /// Update a destination record, or in a dry run only record that it would be
    pub async fn update(
        &mut self,
        kind: Kind,
        name: &str,
        destination_id: &str,
        payload: &Entity,
    ) -> SyncResult<()> {
        if self.is_dry_run() {
            self.state.record_diff(kind, name, DiffAction::Updated);
            self.state.output(format!(
                "Dry run: {} '{}' would be updated on destination.",
                kind, name
            ));
            return Ok(());
        }
        self.state
            .output(format!("Updating {} '{}' on destination.", kind, name));
        let updated = self
            .destination
            .update(kind, destination_id, payload)
            .await
            .map_err(|source| SyncError::Update {
                kind,
                name: name.to_string(),
                source,
            })?;
        self.remember_destination(kind, &updated);
        self.state.record_diff(kind, name, DiffAction::Updated);
        self.state
            .output(format!("Successfully updated {} '{}' on destination.", kind, name));
        Ok(())
    }
}
