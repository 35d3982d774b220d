//! Client configuration shared by every channel of a client.
//!
//! Options are read from an optional JSON file, then overridden from the
//! environment. The authorizer factory override can only be set in code.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use std::{fmt, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{default_authorizer_factory, AuthorizerFactory};
use crate::constants::{DEFAULT_AUTH_ENDPOINT, DEFAULT_AUTH_TIMEOUT};

/// Extra request data sent by the HTTP authorizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    /// Headers added to the auth request.
    pub headers: BTreeMap<String, String>,
    /// Form parameters added after `socket_id` and `channel_name`.
    pub params: BTreeMap<String, String>,
}

/// Configuration of the owning client, handed to authorizer factories.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// URL the HTTP authorizer posts to.
    pub auth_endpoint: String,
    /// Extra headers and params for the HTTP authorizer.
    pub auth: AuthOptions,
    /// HTTP authorizer request timeout in seconds.
    pub auth_timeout_secs: u64,
    /// Custom authorizer factory; takes precedence over the HTTP authorizer.
    #[serde(skip)]
    pub authorizer: Option<AuthorizerFactory>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            auth: AuthOptions::default(),
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT.as_secs(),
            authorizer: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("auth_endpoint", &self.auth_endpoint)
            .field("auth", &self.auth)
            .field("auth_timeout_secs", &self.auth_timeout_secs)
            .field("custom_authorizer", &self.authorizer.is_some())
            .finish()
    }
}

impl ClientOptions {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load options from `path` (or defaults), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut options = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        options.apply_env_overrides();
        Ok(options)
    }

    /// Apply `PUSHER_AUTH_ENDPOINT` and `PUSHER_AUTH_TIMEOUT`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("PUSHER_AUTH_ENDPOINT") {
            self.auth_endpoint = endpoint;
        }

        if let Some(timeout) = lookup("PUSHER_AUTH_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.auth_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid PUSHER_AUTH_TIMEOUT '{}'", timeout),
            }
        }
    }

    /// HTTP authorizer request timeout.
    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    /// Install a custom authorizer factory.
    #[must_use]
    pub fn with_authorizer(mut self, factory: AuthorizerFactory) -> Self {
        self.authorizer = Some(factory);
        self
    }

    /// Add a form parameter to auth requests.
    #[must_use]
    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth.params.insert(key.into(), value.into());
        self
    }

    /// Add a header to auth requests.
    #[must_use]
    pub fn with_auth_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth.headers.insert(key.into(), value.into());
        self
    }

    /// The factory channels use to create their authorizer.
    #[must_use]
    pub fn authorizer_factory(&self) -> AuthorizerFactory {
        self.authorizer
            .clone()
            .unwrap_or_else(default_authorizer_factory)
    }
}
