//! Configuration path resolution
//!
//! Resolves where a connection config lives from the environment (with
//! `.env` support) and loads it into manager options.

use redial::{ManagerOptions, RedialConfig, RedialError};
use std::path::PathBuf;
use tracing::debug;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Connection manager configuration (redial.yaml)
    Redial,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Redial => "redial.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        "REDIAL_CONFIG_PATH"
    }
}

/// Load configuration path from environment or use default
///
/// Custom paths win over the environment.
///
/// # Examples
/// ```
/// use redial_suite::app_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("feeds/binance.yaml".into()));
/// assert_eq!(path.to_str(), Some("feeds/binance.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }

    dotenv::dotenv().ok();
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Resolve the config path, load the YAML and build manager options
pub fn load_options_from_env(config_type: ConfigType) -> redial::Result<ManagerOptions> {
    let path = load_config_from_env(config_type);
    debug!("Loading connection config from {}", path.display());
    let config = RedialConfig::load(&path).map_err(RedialError::from)?;
    config.to_builder().build()
}
