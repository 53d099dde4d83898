//! Cross-instance identity of component records
//!
//! Instance-local ids never match between source and destination, so each
//! kind is matched on a stable attribute instead: a name, a platform uid, a
//! name plus runtime, or (for reports) an id translated through the run's id
//! table.

use std::fmt;

use super::error::{SyncError, SyncResult};
use crate::api::{Entity, Kind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Human name (or login name for users)
    Name(String),
    /// Platform uid that survives export and import
    Uid(String),
    /// Source-side id, matched through the id translation table
    Id(String),
    /// Package name and the Python runtime it is installed for
    Package { name: String, python_version: String },
    /// Records owned one-to-one by an application (workflows)
    Owner(String),
}

impl Identity {
    pub fn of(kind: Kind, entity: &Entity) -> SyncResult<Self> {
        let label = entity.label();
        let required = |key: &str| {
            entity
                .str(key)
                .map(str::to_string)
                .ok_or_else(|| SyncError::access(kind, label.clone(), format!("/{}", key)))
        };
        Ok(match kind {
            Kind::KeyStore
            | Kind::Plugin
            | Kind::Asset
            | Kind::Workspace
            | Kind::Applet
            | Kind::Application
            | Kind::Group
            | Kind::Role => Identity::Name(required("name")?),
            Kind::User => Identity::Name(required("userName")?),
            Kind::Package => Identity::Package {
                name: required("name")?,
                python_version: required("pythonVersion")?,
            },
            Kind::Task | Kind::Dashboard => Identity::Uid(required("uid")?),
            Kind::Report => Identity::Id(required("id")?),
            Kind::Workflow => Identity::Owner(required("applicationId")?),
        })
    }

    /// Whether a destination record carries this identity
    pub fn matches(&self, kind: Kind, candidate: &Entity) -> bool {
        match self {
            Identity::Name(name) if kind == Kind::User => candidate
                .str("userName")
                .is_some_and(|login| login.eq_ignore_ascii_case(name)),
            Identity::Name(name) => candidate.str("name") == Some(name.as_str()),
            Identity::Uid(uid) => candidate.str("uid") == Some(uid.as_str()),
            Identity::Id(id) => candidate.id() == Some(id.as_str()),
            Identity::Package {
                name,
                python_version,
            } => {
                candidate.str("name") == Some(name.as_str())
                    && candidate.str("pythonVersion") == Some(python_version.as_str())
            }
            Identity::Owner(app) => candidate.str("applicationId") == Some(app.as_str()),
        }
    }

    /// Stable string form, used as the recursion-guard key
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Name(name) => write!(f, "{}", name),
            Identity::Uid(uid) => write!(f, "uid:{}", uid),
            Identity::Id(id) => write!(f, "id:{}", id),
            Identity::Package {
                name,
                python_version,
            } => write!(f, "{} ({})", name, python_version),
            Identity::Owner(app) => write!(f, "application:{}", app),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: serde_json::Value) -> Entity {
        Entity::from_value(value).unwrap()
    }

    #[test]
    fn test_tasks_are_identified_by_uid_not_id() {
        let source = entity(json!({"id": "src-7", "uid": "task-uid", "name": "Enrich"}));
        let identity = Identity::of(Kind::Task, &source).unwrap();
        assert_eq!(identity, Identity::Uid("task-uid".into()));

        let renamed_on_destination = entity(json!({"id": "dst-1", "uid": "task-uid", "name": "Enrich v2"}));
        assert!(identity.matches(Kind::Task, &renamed_on_destination));
        let other = entity(json!({"id": "src-7", "uid": "other", "name": "Enrich"}));
        assert!(!identity.matches(Kind::Task, &other));
    }

    #[test]
    fn test_packages_match_on_name_and_runtime() {
        let source = entity(json!({"name": "requests", "pythonVersion": "Python3", "version": "2"}));
        let identity = Identity::of(Kind::Package, &source).unwrap();
        assert!(identity.matches(Kind::Package, &entity(json!({"name": "requests", "pythonVersion": "Python3"}))));
        assert!(!identity.matches(Kind::Package, &entity(json!({"name": "requests", "pythonVersion": "Python2_7"}))));
    }

    #[test]
    fn test_users_match_login_case_insensitively() {
        let identity = Identity::of(Kind::User, &entity(json!({"userName": "Analyst"}))).unwrap();
        assert!(identity.matches(Kind::User, &entity(json!({"userName": "analyst"}))));
    }

    #[test]
    fn test_missing_identity_field_is_an_access_error() {
        let err = Identity::of(Kind::Dashboard, &entity(json!({"name": "SOC"}))).unwrap_err();
        assert!(matches!(err, SyncError::Access { ref path, .. } if path == "/uid"));
    }
}
