//! Agent configuration

use anyhow::{bail, Context, Result};
use carecast_lib::DEFAULT_HORIZONS;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration, read from `CARECAST_*` environment variables and an
/// optional `carecast.{toml,yaml,json}` file in the working directory
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding persisted forecast models
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// CSV series used to train at startup when no models can be loaded
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Forecast horizons in hours
    #[serde(default = "default_horizons")]
    pub horizons: Vec<u32>,

    /// Upper bound on a single train or optimize call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_service_name() -> String {
    "carecast-agent".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./models")
}

fn default_horizons() -> Vec<u32> {
    DEFAULT_HORIZONS.to_vec()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            model_dir: default_model_dir(),
            data_path: None,
            horizons: default_horizons(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("carecast").required(false))
            .add_source(
                config::Environment::with_prefix("CARECAST")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("horizons"),
            )
            .build()
            .context("Failed to read agent configuration")?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizons.is_empty() || self.horizons.contains(&0) {
            bail!("horizons must be a non-empty list of positive hours");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
