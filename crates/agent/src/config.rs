//! Agent configuration

use agent_lib::thresholds::{ConfigError, ThresholdConfig, DEFAULT_THRESHOLDS_JSON};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
const CONFIG_FILE_ENV: &str = "AGENT_CONFIG_FILE";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name reported in logs and alerts
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Number of ticks to run; 0 runs until shutdown
    #[serde(default)]
    pub iterations: u64,

    /// Threshold document; the built-in defaults are used when unset
    #[serde(default)]
    pub thresholds_path: Option<PathBuf>,

    /// Value reported as the USE `errors` field
    #[serde(default)]
    pub errors_constant: f64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8999
}

fn default_tick_interval() -> u64 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            tick_interval_secs: default_tick_interval(),
            iterations: 0,
            thresholds_path: None,
            errors_constant: 0.0,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the optional config file and `AGENT_*` variables
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file)
    }

    /// Load configuration, layering environment variables over `file`
    pub fn load_from(file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("AGENT"))
            .build()
            .context("Failed to read agent configuration")?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        agent.validate()?;

        Ok(agent)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be at least 1");
        }
        if !self.errors_constant.is_finite() {
            anyhow::bail!("errors_constant must be a finite number");
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Parse and validate the threshold document
    pub fn thresholds(&self) -> Result<ThresholdConfig, ConfigError> {
        match &self.thresholds_path {
            Some(path) => ThresholdConfig::from_path(path),
            None => ThresholdConfig::from_json_str(DEFAULT_THRESHOLDS_JSON),
        }
    }
}
