//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod sources;
mod storage;

pub use sources::{
    RegistryConfig, ReleasesConfig, ScanConfig, DEFAULT_RELEASES_BASE_URL, DEFAULT_TOKEN_ENV,
};
pub use storage::{MongodbConfig, StorageConfig};

use serde::Deserialize;

use crate::environment::{EnvironmentError, EnvironmentSet, DEFAULT_ENVIRONMENTS};
use crate::orchestrator::DEFAULT_CONCURRENCY;
use crate::publish::FieldLayout;
use crate::sync::SyncOptions;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "TAGVANE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "TAGVANE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "TAGVANE_LOG";
/// Environment variable selecting the log format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "TAGVANE_LOG_FORMAT";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid environments: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracked environments, in publish order.
    pub environments: Vec<String>,
    /// Services aggregated concurrently.
    pub concurrency: usize,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Container registry and cluster location.
    pub registry: RegistryConfig,
    /// Release information API.
    pub releases: ReleasesConfig,
    /// Running-image scan.
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environments: DEFAULT_ENVIRONMENTS.iter().map(|e| e.to_string()).collect(),
            concurrency: DEFAULT_CONCURRENCY,
            storage: StorageConfig::default(),
            registry: RegistryConfig::default(),
            releases: ReleasesConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, e.g.
    ///    `TAGVANE__STORAGE__MONGODB__HOST_AND_PORT`. `TAGVANE__ENVIRONMENTS`
    ///    takes a comma-separated list.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("environments")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// The configured environments as a validated set.
    pub fn environment_set(&self) -> Result<EnvironmentSet, EnvironmentError> {
        EnvironmentSet::new(&self.environments)
    }

    /// Run settings derived from this configuration.
    pub fn sync_options(&self) -> Result<SyncOptions, ConfigError> {
        let mongodb = &self.storage.mongodb;
        if mongodb.config_singleton.is_empty() {
            return Err(ConfigError::Missing("storage.mongodb.config_singleton"));
        }

        Ok(SyncOptions {
            environments: self.environment_set()?,
            concurrency: self.concurrency,
            cache_key: mongodb.config_singleton.clone(),
            layout: FieldLayout::new(mongodb.field_root.clone()),
        })
    }
}
