//! Layered configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Config file: explicit path, else `HOSTBRIDGE_CONFIG_PATH`, else an
//!    optional `hostbridge.toml` in the working directory
//! 3. Environment variables such as `HOSTBRIDGE__ENGINE__MAX_DEPTH=64`

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::context::ContextOptions;

const ENV_PREFIX: &str = "HOSTBRIDGE";
const CONFIG_PATH_VAR: &str = "HOSTBRIDGE_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "hostbridge.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: ContextOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from the default search path and the environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn context_options(&self) -> ContextOptions {
        self.engine
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Read this file instead of searching; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn build(self) -> Result<Config> {
        let (path, required) = match self.config_path {
            Some(path) => (path, true),
            None => match std::env::var(CONFIG_PATH_VAR) {
                Ok(path) if !path.is_empty() => (PathBuf::from(path), true),
                _ => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
            },
        };

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config
            .engine
            .validate()
            .context("Invalid [engine] configuration")?;

        Ok(config)
    }
}
