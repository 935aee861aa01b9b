//! Agent configuration file

use anyhow::{Context, Result};
use rincon_api::{Route, Service};
use rincon_client::ClientConfig;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the agent configuration file
pub const CONFIG_PATH_ENV: &str = "RINCON_AGENT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "rincon-agent.yaml";

/// What the agent registers and where
#[derive(Clone, Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub registry: ClientConfig,

    pub service: Service,

    #[serde(default)]
    pub routes: Vec<Route>,
}

impl AgentConfig {
    /// Load the file named by the first argument, RINCON_AGENT_CONFIG, or
    /// ./rincon-agent.yaml, then apply RINCON_* overrides
    pub fn load() -> Result<Self> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let mut config = Self::from_file(&path)?;
        config
            .registry
            .apply_vars(|key| std::env::var(key).ok())
            .context("applying RINCON_* environment overrides")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading agent config {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("parsing agent config {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            anyhow::bail!("service.name must not be empty");
        }
        self.registry.validate()?;
        Ok(())
    }
}
