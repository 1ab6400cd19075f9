//! Engine configuration, persisted at `~/.bidledger/config.json`.
//!
//! A missing file is not an error: defaults give a working single-user
//! setup. Credential acquisition is handled by the embedding application;
//! the config only carries what the engine itself needs.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Display name of the ledger workbook, looked up (or created) by name.
    #[serde(default = "default_workbook_name")]
    pub workbook_name: String,

    /// E-mail granted writer access when the workbook is first created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_email: Option<String>,

    /// Override for the reference database path. Defaults to
    /// `~/.bidledger/bidledger.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_workbook_name() -> String {
    "Bid Results Tracker".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workbook_name: default_workbook_name(),
            share_email: None,
            db_path: None,
        }
    }
}

impl Config {
    /// Resolved reference database path: the override if set, else the
    /// default under `~/.bidledger/`.
    pub fn reference_db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.db_path {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
        Ok(home.join(".bidledger").join("bidledger.db"))
    }
}

/// Canonical config file path: `~/.bidledger/config.json`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".bidledger").join("config.json"))
}

/// Load configuration from disk; a missing file yields the defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Write configuration to disk, creating `~/.bidledger/` if needed.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(())
}
