//! Client configuration, loaded from YAML or the environment

use crate::heartbeat::BackoffPolicy;
use crate::{ClientError, Result};
use rincon_api::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Who keeps the registration alive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatMode {
    /// The registry polls the service's health check endpoint
    #[default]
    Server,
    /// The client re-registers itself on a fixed interval
    Client,
}

/// Configuration for a RegistryClient
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL of the registry (e.g., "http://rincon:10311")
    pub base_url: String,

    pub heartbeat_mode: HeartbeatMode,

    /// Heartbeat interval in whole seconds
    pub heartbeat_interval_secs: u64,

    pub auth_user: String,

    pub auth_password: String,

    /// Default timeout applied to every registry request
    pub request_timeout_secs: u64,

    /// Pin the registry API revision; negotiated at connect when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolVersion>,

    /// Delay policy between heartbeats after failures
    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:10311".to_string(),
            heartbeat_mode: HeartbeatMode::Server,
            heartbeat_interval_secs: 10,
            auth_user: "admin".to_string(),
            auth_password: "admin".to_string(),
            request_timeout_secs: 10,
            protocol: None,
            backoff: BackoffPolicy::Fixed,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given registry URL and credentials
    pub fn new(
        base_url: impl Into<String>,
        auth_user: impl Into<String>,
        auth_password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            auth_user: auth_user.into(),
            auth_password: auth_password.into(),
            ..Default::default()
        }
    }

    /// Switch to client heartbeats every `interval_secs` seconds
    pub fn with_client_heartbeat(mut self, interval_secs: u64) -> Self {
        self.heartbeat_mode = HeartbeatMode::Client;
        self.heartbeat_interval_secs = interval_secs;
        self
    }

    /// Load configuration from the RINCON_* environment variables,
    /// falling back to defaults for unset ones
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_vars(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    /// Override fields from variables returned by `lookup`
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RINCON_URL") {
            self.base_url = url;
        }
        if let Some(mode) = lookup("RINCON_HEARTBEAT_MODE") {
            self.heartbeat_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "server" => HeartbeatMode::Server,
                "client" => HeartbeatMode::Client,
                other => {
                    return Err(ClientError::Config(format!(
                        "RINCON_HEARTBEAT_MODE must be 'server' or 'client', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(interval) = lookup("RINCON_HEARTBEAT_INTERVAL") {
            self.heartbeat_interval_secs = parse_secs("RINCON_HEARTBEAT_INTERVAL", &interval)?;
        }
        if let Some(user) = lookup("RINCON_USER") {
            self.auth_user = user;
        }
        if let Some(password) = lookup("RINCON_PASSWORD") {
            self.auth_password = password;
        }
        if let Some(timeout) = lookup("RINCON_TIMEOUT") {
            self.request_timeout_secs = parse_secs("RINCON_TIMEOUT", &timeout)?;
        }
        if let Some(protocol) = lookup("RINCON_PROTOCOL") {
            let protocol = protocol
                .parse::<ProtocolVersion>()
                .map_err(|e| ClientError::Config(e.to_string()))?;
            self.protocol = Some(protocol);
        }
        Ok(())
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_mode == HeartbeatMode::Client && self.heartbeat_interval_secs == 0 {
            return Err(ClientError::Config(
                "heartbeat_interval_secs must be greater than zero in client heartbeat mode"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ClientError::Config(format!("{} must be a number of seconds, got '{}'", key, value)))
}
