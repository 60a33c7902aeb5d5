//! Process configuration
//!
//! Read from `ADJUDICATOR_*` environment variables; nested keys use `__`,
//! e.g. `ADJUDICATOR_DATABASE__URL` or `ADJUDICATOR_ENGINE__MAX_CYCLES`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

use domain_adjudication::EngineConfig;
use infra_db::DatabaseConfig;

const ENV_PREFIX: &str = "ADJUDICATOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/adjudication".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseSettings {
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

/// Everything the binary needs to start
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(environment())
    }

    fn load(source: Environment) -> Result<Self, ConfigError> {
        let mut config: AppConfig = Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        if config.log_level.is_empty() {
            config.log_level = "info".to_string();
        }
        config
            .engine
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
