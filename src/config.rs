//! Configuration loading
//!
//! Applications load store settings from `config/config.toml` or
//! `TIDEPOOL__`-prefixed environment variables via [`StoreConfig::load`].
//! [`OrmDefaults`] carries the ORM-level defaults a [`crate::Registry`] is
//! constructed with.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Connection settings consumed by a transport implementation
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default)]
    pub orm: OrmDefaults,
}

/// ORM-level defaults applied to models that do not override them
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrmDefaults {
    /// Stamp `createTime`/`updateTime` on writes unless a model opts out
    #[serde(default = "default_timestamps")]
    pub timestamps: bool,
}

impl Default for OrmDefaults {
    fn default() -> Self {
        Self { timestamps: true }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    28015
}

fn default_db() -> String {
    "test".to_string()
}

fn default_timestamps() -> bool {
    true
}

impl StoreConfig {
    /// Load the store configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        // Build configuration by reading the TOML file (optional) and environment variables
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("TIDEPOOL").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // If the file existed but was unreadable, warn and retry with env only
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!("failed to load config file, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("TIDEPOOL").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        let store_config: StoreConfig = settings.get::<StoreConfig>("store").map_err(|e| {
            ConfigError::Message(format!(
                "Store configuration could not be loaded from file or environment: {e}"
            ))
        })?;

        Ok(store_config)
    }
}
