//! Application configuration, read once at startup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use pyplyn_core::error::ConfigError;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub global: GlobalConfig,
    #[serde(default)]
    pub hazelcast: HazelcastConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

/// Paths and cadence of the configuration update cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub configurations_path: PathBuf,
    pub connectors_path: PathBuf,
    /// Process every configuration once, then exit.
    #[serde(default)]
    pub run_once: bool,
    pub update_configuration_interval_millis: i64,
}

/// Cluster membership settings. The membership backend itself is an external
/// collaborator; when disabled every node is its own master.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazelcastConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<String>,
}

fn default_check_interval_millis() -> i64 {
    60_000
}

/// Status-alert settings: meter thresholds checked on a fixed cadence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_check_interval_millis")]
    pub check_interval_millis: i64,
    /// Keyed by `<meterName>.<kind>`, e.g. `Refocus.failure`.
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval_millis: default_check_interval_millis(),
            thresholds: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
