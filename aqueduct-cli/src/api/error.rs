//! Transport-level errors raised by an `Instance`

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// A failure talking to a platform instance.
///
/// "Not found" is never an error: lookups return `Ok(None)` for absent records.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to '{endpoint}' failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} '{endpoint}' returned HTTP {status}: {body}")]
    Status {
        method: String,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from '{endpoint}': {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The instance accepted the call but returned nothing usable
    #[error("{0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Whether the instance answered with a 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}
