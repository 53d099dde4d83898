use std::time::Duration;

use anyhow::{Context, Result};
use colored::*;
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};

use crate::api::{ConnectOptions, Credentials, HttpInstance};

fn default_timeout_secs() -> u64 {
    120
}

/// The `[source]` and `[destination]` sections
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    pub verify_ssl: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: None,
            password: None,
            access_token: None,
            verify_ssl: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Secrets stay out of debug output
impl std::fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl InstanceConfig {
    pub fn validate(&self, label: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("No host configured for the {} instance", label);
        }
        if self.access_token.is_none() && self.username.is_none() {
            anyhow::bail!(
                "The {} instance needs either a username and password or an access token",
                label
            );
        }
        Ok(())
    }

    /// Resolve credentials, prompting for a missing password on a terminal
    pub fn credentials(&self, label: &str) -> Result<Credentials> {
        if let Some(token) = &self.access_token {
            return Ok(Credentials::AccessToken(token.clone()));
        }
        let username = self
            .username
            .clone()
            .with_context(|| format!("No username configured for the {} instance", label))?;
        let password = match &self.password {
            Some(password) => password.clone(),
            None if std::io::stdin().is_terminal() => rpassword::prompt_password(format!(
                "Password for {} on {}: ",
                username.bold(),
                self.host.cyan()
            ))
            .context("Failed to read password")?,
            None => anyhow::bail!(
                "No password for the {} instance; set AQUEDUCT_{}_PASSWORD",
                label,
                label.to_uppercase()
            ),
        };
        Ok(Credentials::Password { username, password })
    }

    /// Log in to the instance
    pub async fn connect(&self, label: &str) -> Result<HttpInstance> {
        let options = ConnectOptions {
            host: self.host.clone(),
            credentials: self.credentials(label)?,
            verify_ssl: self.verify_ssl,
            timeout: Duration::from_secs(self.timeout_secs),
        };
        if !self.verify_ssl {
            log::warn!("TLS certificate verification is disabled for {}", self.host);
        }
        HttpInstance::connect(options)
            .await
            .with_context(|| format!("Failed to connect to the {} instance at {}", label, self.host))
    }
}
