//! Loosely-typed records exchanged with a platform instance
//!
//! The platform's schema is dynamic, so every component is carried as a generic
//! JSON object (`Entity`) tagged by its `Kind`. Syncers read the handful of
//! well-known keys they need through the accessors here or through the typed
//! views in `api::views`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every component kind the migration engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    KeyStore,
    Package,
    Plugin,
    Asset,
    Workspace,
    Applet,
    Application,
    Workflow,
    Task,
    Report,
    Dashboard,
    User,
    Group,
    Role,
}

impl Kind {
    /// All kinds, in the order the orchestrator syncs them
    pub const ALL: [Kind; 14] = [
        Kind::KeyStore,
        Kind::Package,
        Kind::Plugin,
        Kind::Asset,
        Kind::Workspace,
        Kind::Applet,
        Kind::Application,
        Kind::Workflow,
        Kind::Task,
        Kind::Report,
        Kind::Dashboard,
        Kind::User,
        Kind::Group,
        Kind::Role,
    ];

    /// Singular, lowercase name used in log lines and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::KeyStore => "keystore",
            Kind::Package => "package",
            Kind::Plugin => "plugin",
            Kind::Asset => "asset",
            Kind::Workspace => "workspace",
            Kind::Applet => "applet",
            Kind::Application => "application",
            Kind::Workflow => "workflow",
            Kind::Task => "task",
            Kind::Report => "report",
            Kind::Dashboard => "dashboard",
            Kind::User => "user",
            Kind::Group => "group",
            Kind::Role => "role",
        }
    }

    /// Plural collection name used for include/exclude filters and component selection
    pub fn collection(&self) -> &'static str {
        match self {
            Kind::KeyStore => "keystore",
            Kind::Package => "packages",
            Kind::Plugin => "plugins",
            Kind::Asset => "assets",
            Kind::Workspace => "workspaces",
            Kind::Applet => "applets",
            Kind::Application => "applications",
            Kind::Workflow => "workflows",
            Kind::Task => "tasks",
            Kind::Report => "reports",
            Kind::Dashboard => "dashboards",
            Kind::User => "users",
            Kind::Group => "groups",
            Kind::Role => "roles",
        }
    }

    /// Parse a collection name (`"tasks"`) or singular name (`"task"`)
    pub fn from_collection(name: &str) -> Option<Kind> {
        let name = name.trim().to_ascii_lowercase();
        Kind::ALL
            .iter()
            .copied()
            .find(|k| k.collection() == name || k.as_str() == name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single component record as returned by an instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, returning `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Non-empty string value of a top-level key
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The instance-local opaque id
    pub fn id(&self) -> Option<&str> {
        self.str("id")
    }

    /// The human name of a record: `name`, falling back to `displayName` then `userName`
    pub fn name(&self) -> Option<&str> {
        self.str("name")
            .or_else(|| self.str("displayName"))
            .or_else(|| self.str("userName"))
    }

    /// Name for log lines and error messages; never empty
    pub fn label(&self) -> String {
        self.name()
            .or_else(|| self.id())
            .unwrap_or("<unnamed>")
            .to_string()
    }

    /// Resolve a slash-separated path (`/action/descriptor/actionType`).
    ///
    /// Numeric segments index into arrays.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let mut segments = path.trim_start_matches('/').split('/');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Non-empty string at a path
    pub fn pointer_str(&self, path: &str) -> Option<&str> {
        self.pointer(path)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Set the value at a path whose parent object already exists.
    ///
    /// Returns `false` (and changes nothing) when any parent segment is missing
    /// or is not an object.
    pub fn set_pointer(&mut self, path: &str, value: Value) -> bool {
        let path = path.trim_start_matches('/');
        let (parent, leaf) = match path.rsplit_once('/') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, path),
        };
        let target = match parent {
            None => Some(&mut self.0),
            Some(parent) => {
                let (first, rest) = match parent.split_once('/') {
                    Some((first, rest)) => (first, Some(rest)),
                    None => (parent, None),
                };
                let root = self.0.get_mut(first);
                let node = match (root, rest) {
                    (Some(node), None) => Some(node),
                    (Some(node), Some(rest)) => node.pointer_mut(&format!("/{}", rest)),
                    (None, _) => None,
                };
                node.and_then(|n| n.as_object_mut())
            }
        };
        match target {
            Some(map) => {
                map.insert(leaf.to_string(), value);
                true
            }
            None => false,
        }
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The identity of the account a client is authenticated as
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SessionIdentity {
    /// Whether a user record refers to this session's own account
    pub fn matches(&self, user: &Entity) -> bool {
        let login_matches = user
            .str("userName")
            .is_some_and(|u| u.eq_ignore_ascii_case(&self.user_name));
        let display_matches = match (&self.display_name, user.str("displayName")) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        };
        login_matches || display_matches
    }
}

/// Request body for installing a Python package on an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstall {
    pub name: String,
    pub version: String,
    pub python_version: String,
}

impl PackageInstall {
    /// Build an install request from a package record.
    ///
    /// Fails with the name of the offending field when a required value is
    /// missing or empty.
    pub fn from_entity(package: &Entity) -> Result<Self, String> {
        let field = |key: &str| {
            package
                .str(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("field '{}' must be a non-empty string", key))
        };
        Ok(Self {
            name: field("name")?,
            version: field("version")?,
            python_version: field("pythonVersion")?,
        })
    }
}
