//! Error taxonomy of the reconciliation engine
//!
//! Every variant names the component kind and the item being processed so an
//! operator working from heterogeneous source data can find the culprit.

use thiserror::Error;

use crate::api::{ApiError, Kind};

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A referenced record could not be found where it was expected
    #[error("unable to find {kind} '{name}': {reason}")]
    Lookup {
        kind: Kind,
        name: String,
        reason: String,
    },

    /// The destination rejected, or returned nothing for, a create
    #[error("failed to add {kind} '{name}' to destination: {source}")]
    Add {
        kind: Kind,
        name: String,
        #[source]
        source: ApiError,
    },

    /// The destination rejected, or returned nothing for, an update
    #[error("failed to update {kind} '{name}' on destination: {source}")]
    Update {
        kind: Kind,
        name: String,
        #[source]
        source: ApiError,
    },

    /// A record lacks a field the engine relies on
    #[error("{kind} '{name}' is missing expected field '{path}'")]
    Access {
        kind: Kind,
        name: String,
        path: String,
    },

    /// A record built in memory failed its field constraints
    #[error("{kind} '{name}' failed validation: {reason}")]
    ModelValidation {
        kind: Kind,
        name: String,
        reason: String,
    },

    /// A read against either system failed outright
    #[error("failed to {action} {kind} '{name}' on {host}: {source}")]
    Api {
        kind: Kind,
        action: &'static str,
        name: String,
        host: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to read the product version of {host}: {source}")]
    Version {
        host: String,
        #[source]
        source: ApiError,
    },

    #[error(
        "migrating from version {source_version} to {destination_version} is not supported"
    )]
    VersionMismatch {
        source_version: String,
        destination_version: String,
    },
}

impl SyncError {
    pub fn lookup(kind: Kind, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Lookup {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn access(kind: Kind, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Access {
            kind,
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn api(
        kind: Kind,
        action: &'static str,
        name: impl Into<String>,
        host: impl Into<String>,
        source: ApiError,
    ) -> Self {
        Self::Api {
            kind,
            action,
            name: name.into(),
            host: host.into(),
            source,
        }
    }

    /// Item-level failures a collection sync may skip past
    pub fn is_lookup(&self) -> bool {
        matches!(self, SyncError::Lookup { .. })
    }

    /// The destination refused a create or update of one record
    pub fn is_write_failure(&self) -> bool {
        matches!(self, SyncError::Add { .. } | SyncError::Update { .. })
    }
}
