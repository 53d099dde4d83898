//! In-memory `Instance` used by the engine tests
//!
//! Records are kept per kind. Like the platform, a create keeps the id it was
//! given unless that id is taken; otherwise, and for every generated plugin,
//! file and tracking id, a fresh id with the instance's prefix is allocated.
//! Every mutating call is recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::context::SyncContext;
use super::state::{Filters, RunOptions};
use crate::api::{ApiError, ApiResult, Entity, Instance, Kind, PackageInstall, SessionIdentity};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Add(Kind, Entity),
    Update(Kind, String, Entity),
    UploadPlugin(String),
    UpgradePlugin(String),
    InstallPackage(PackageInstall),
    InstallPackageOffline(String, PackageInstall),
}

impl Call {
    pub fn kind(&self) -> Kind {
        match self {
            Call::Add(kind, _) | Call::Update(kind, _, _) => *kind,
            Call::UploadPlugin(_) | Call::UpgradePlugin(_) => Kind::Plugin,
            Call::InstallPackage(_) | Call::InstallPackageOffline(_, _) => Kind::Package,
        }
    }
}

#[derive(Default)]
struct Store {
    records: HashMap<Kind, Vec<Entity>>,
    files: HashMap<String, Vec<u8>>,
    calls: Vec<Call>,
    failing_adds: HashSet<(Kind, String)>,
}

pub struct MemoryInstance {
    host: String,
    prefix: String,
    version: Mutex<String>,
    session: Mutex<SessionIdentity>,
    next_id: AtomicU64,
    store: Mutex<Store>,
}

impl MemoryInstance {
    pub fn new(host: &str, prefix: &str) -> Self {
        Self {
            host: host.to_string(),
            prefix: prefix.to_string(),
            version: Mutex::new("10.5.2".to_string()),
            session: Mutex::new(SessionIdentity {
                user_name: "admin".to_string(),
                display_name: Some("Admin".to_string()),
            }),
            next_id: AtomicU64::new(1),
            store: Mutex::new(Store::default()),
        }
    }

    pub fn source() -> Self {
        Self::new("https://source.example", "src")
    }

    pub fn destination() -> Self {
        Self::new("https://destination.example", "dst")
    }

    fn fresh_id(&self, what: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}-{}", self.prefix, what, n)
    }

    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    pub fn set_session(&self, user_name: &str) {
        *self.session.lock().unwrap() = SessionIdentity {
            user_name: user_name.to_string(),
            display_name: None,
        };
    }

    /// Insert a record as-is, allocating an id when it has none
    pub fn seed(&self, kind: Kind, value: Value) -> Entity {
        let mut entity = Entity::from_value(value).unwrap();
        if entity.id().is_none() {
            entity.insert("id", self.fresh_id(kind.as_str()));
        }
        self.store
            .lock()
            .unwrap()
            .records
            .entry(kind)
            .or_default()
            .push(entity.clone());
        entity
    }

    /// Store a downloadable file (plugin bundle or wheel) under an id
    pub fn seed_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.store
            .lock()
            .unwrap()
            .files
            .insert(file_id.to_string(), bytes);
    }

    /// Make every add (or package install) of the named record fail
    pub fn fail_adds_of(&self, kind: Kind, name: &str) {
        self.store
            .lock()
            .unwrap()
            .failing_adds
            .insert((kind, name.to_string()));
    }

    pub fn records(&self, kind: Kind) -> Vec<Entity> {
        self.store
            .lock()
            .unwrap()
            .records
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, kind: Kind, name: &str) -> Option<Entity> {
        self.records(kind).into_iter().find(|e| e.name() == Some(name))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.store.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.store.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) {
        self.store.lock().unwrap().calls.push(call);
    }

    fn upsert(&self, kind: Kind, entity: Entity) {
        let mut store = self.store.lock().unwrap();
        let records = store.records.entry(kind).or_default();
        match records.iter().position(|e| e.id() == entity.id()) {
            Some(i) => records[i] = entity,
            None => records.push(entity),
        }
    }

    /// Install a plugin bundle: the bundle bytes are the plugin record as JSON.
    /// The installed copy gets fresh file, action and image ids.
    fn refuse_failing(&self, kind: Kind, name: &str) -> ApiResult<()> {
        if self
            .store
            .lock()
            .unwrap()
            .failing_adds
            .contains(&(kind, name.to_string()))
        {
            return Err(ApiError::rejected(format!("add of '{}' refused", name)));
        }
        Ok(())
    }

    fn install_bundle(&self, bundle: &[u8]) -> ApiResult<Entity> {
        let value: Value = serde_json::from_slice(bundle)
            .map_err(|e| ApiError::rejected(format!("bad bundle: {}", e)))?;
        let mut plugin = Entity::from_value(value).ok_or_else(|| ApiError::rejected("bad bundle"))?;
        let existing = plugin
            .str("name")
            .and_then(|name| self.find(Kind::Plugin, name))
            .and_then(|e| e.id().map(str::to_string));
        plugin.insert("id", existing.unwrap_or_else(|| self.fresh_id("plugin")));
        plugin.insert("fileId", self.fresh_id("file"));
        if let Some(Value::Array(actions)) = plugin.get_mut("availableActionDescriptors") {
            for action in actions.iter_mut() {
                action["id"] = json!(self.fresh_id("action"));
                action["imageId"] = json!(self.fresh_id("image"));
            }
        }
        self.upsert(Kind::Plugin, plugin.clone());
        Ok(plugin)
    }
}

#[async_trait]
impl Instance for MemoryInstance {
    fn host(&self) -> &str {
        &self.host
    }

    async fn product_version(&self) -> ApiResult<String> {
        Ok(self.version.lock().unwrap().clone())
    }

    async fn session_user(&self) -> ApiResult<SessionIdentity> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn list(&self, kind: Kind) -> ApiResult<Vec<Entity>> {
        Ok(self.records(kind))
    }

    async fn get(&self, kind: Kind, id: &str) -> ApiResult<Option<Entity>> {
        Ok(self.records(kind).into_iter().find(|e| e.id() == Some(id)))
    }

    async fn add(&self, kind: Kind, entity: &Entity) -> ApiResult<Entity> {
        self.refuse_failing(kind, &entity.label())?;
        self.record(Call::Add(kind, entity.clone()));
        let mut created = entity.clone();
        let taken = created
            .id()
            .is_some_and(|id| self.records(kind).iter().any(|e| e.id() == Some(id)));
        if created.id().is_none() || taken {
            created.insert("id", self.fresh_id(kind.as_str()));
        }
        if kind == Kind::Application {
            created.insert("trackingFieldId", self.fresh_id("tracking"));
        }
        self.upsert(kind, created.clone());
        Ok(created)
    }

    async fn update(&self, kind: Kind, id: &str, entity: &Entity) -> ApiResult<Entity> {
        self.record(Call::Update(kind, id.to_string(), entity.clone()));
        let mut updated = entity.clone();
        updated.insert("id", id);
        self.upsert(kind, updated.clone());
        Ok(updated)
    }

    async fn get_workflow(&self, application_id: &str) -> ApiResult<Option<Entity>> {
        Ok(self
            .records(Kind::Workflow)
            .into_iter()
            .find(|w| w.str("applicationId") == Some(application_id)))
    }

    async fn get_default_report_by_application_id(
        &self,
        application_id: &str,
    ) -> ApiResult<Option<Entity>> {
        Ok(self.records(Kind::Report).into_iter().find(|r| {
            r.str("name") == Some("Default")
                && r.pointer_str("/applicationIds/0") == Some(application_id)
        }))
    }

    async fn search_user(&self, login_name: &str) -> ApiResult<Option<Entity>> {
        Ok(self.records(Kind::User).into_iter().find(|u| {
            u.str("userName")
                .is_some_and(|l| l.eq_ignore_ascii_case(login_name))
        }))
    }

    async fn download_plugin(&self, file_id: &str) -> ApiResult<Vec<u8>> {
        self.store
            .lock()
            .unwrap()
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| ApiError::rejected(format!("no file '{}'", file_id)))
    }

    async fn upload_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity> {
        self.record(Call::UploadPlugin(filename.to_string()));
        self.install_bundle(&bundle)
    }

    async fn upgrade_plugin(&self, filename: &str, bundle: Vec<u8>) -> ApiResult<Entity> {
        self.record(Call::UpgradePlugin(filename.to_string()));
        self.install_bundle(&bundle)
    }

    async fn install_package(&self, package: &PackageInstall) -> ApiResult<Entity> {
        self.refuse_failing(Kind::Package, &package.name)?;
        self.record(Call::InstallPackage(package.clone()));
        Ok(self.seed(Kind::Package, serde_json::to_value(package).unwrap()))
    }

    async fn install_package_offline(
        &self,
        filename: &str,
        _wheel: Vec<u8>,
        package: &PackageInstall,
    ) -> ApiResult<Entity> {
        self.refuse_failing(Kind::Package, &package.name)?;
        self.record(Call::InstallPackageOffline(filename.to_string(), package.clone()));
        Ok(self.seed(Kind::Package, serde_json::to_value(package).unwrap()))
    }
}

/// Plugin bundle bytes as the memory instance understands them
pub fn bundle(plugin: &Value) -> Vec<u8> {
    serde_json::to_vec(plugin).unwrap()
}

/// A context over two memory instances
pub fn context(
    source: &Arc<MemoryInstance>,
    destination: &Arc<MemoryInstance>,
    options: RunOptions,
) -> SyncContext {
    context_with_filters(source, destination, options, Filters::new())
}

pub fn context_with_filters(
    source: &Arc<MemoryInstance>,
    destination: &Arc<MemoryInstance>,
    options: RunOptions,
    filters: Filters,
) -> SyncContext {
    let source: Arc<dyn Instance> = source.clone();
    let destination: Arc<dyn Instance> = destination.clone();
    SyncContext::new(source, destination, options, filters)
}

pub fn live() -> RunOptions {
    RunOptions {
        update_reports: true,
        update_dashboards: true,
        update_default_reports: true,
        ..RunOptions::default()
    }
}

pub fn dry_run() -> RunOptions {
    RunOptions {
        dry_run: true,
        ..live()
    }
}
