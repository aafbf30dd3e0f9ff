//! TOML-based application configuration.
//!
//! Stores:
//! - Sync policy (grace period, poll interval, retry cadence, timeouts)
//! - Gateway endpoint and credentials
//!
//! Configuration is stored at `~/.config/habitloop/config.toml`. The policy
//! values are tuning knobs, not behavioral guarantees: nothing in the engine
//! depends on their exact magnitude beyond eventual application.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Timing policy for activity gating and background sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Window after the last interaction during which the user counts as
    /// active (seconds).
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Background poll interval (seconds).
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Cadence at which deferred work re-checks activity (seconds).
    #[serde(default = "default_retry_cadence")]
    pub retry_cadence_secs: u64,
    /// Timeout for a single gateway call (seconds).
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,
    /// Delay before retrying a rollover resync that could not run (seconds).
    #[serde(default = "default_rollover_retry")]
    pub rollover_retry_secs: u64,
}

/// Remote endpoint settings for the progress gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub user_id: String,
    /// Opaque bearer token supplied by the host's auth flow.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/habitloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncPolicy,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// Default functions
fn default_grace_period() -> u64 {
    30
}
fn default_sync_interval() -> u64 {
    300
}
fn default_retry_cadence() -> u64 {
    10
}
fn default_gateway_timeout() -> u64 {
    12
}
fn default_rollover_retry() -> u64 {
    60
}
fn default_base_url() -> String {
    "https://api.habitloop.app".into()
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
            sync_interval_secs: default_sync_interval(),
            retry_cadence_secs: default_retry_cadence(),
            gateway_timeout_secs: default_gateway_timeout(),
            rollover_retry_secs: default_rollover_retry(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: String::new(),
            auth_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    fn path() -> Result<std::path::PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: std::path::PathBuf::from("~/.config/habitloop"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }
}
