//! Application configuration management.
//!
//! This module handles loading and saving the offgrid configuration: where the
//! local store lives, the default cache TTL, background job intervals and the
//! connectivity probe URL.
//!
//! Configuration is stored at `~/.config/offgrid/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::{StoreLocation, DEFAULT_CACHE_TTL};

/// Application name used for config/data directory paths
const APP_NAME: &str = "offgrid";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Database file name inside the data directory
const DATABASE_FILE: &str = "offline.db";

/// Environment variable overriding the database path
pub const ENV_DATABASE: &str = "OFFGRID_DATABASE";

/// Environment variable overriding the probe URL
pub const ENV_PROBE_URL: &str = "OFFGRID_PROBE_URL";

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL.as_secs()
}

fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

fn default_probe_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Explicit database path; defaults to the platform data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub probe_url: Option<String>,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Write logs to a daily file here in addition to stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            default_cache_ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            probe_url: None,
            probe_interval_secs: default_probe_interval_secs(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Defaults when `path` does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `OFFGRID_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(ENV_DATABASE) {
            if !path.is_empty() {
                self.database_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var(ENV_PROBE_URL) {
            if !url.is_empty() {
                self.probe_url = Some(url);
            }
        }
        self
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(DATABASE_FILE))
    }

    pub fn store_location(&self) -> Result<StoreLocation> {
        Ok(StoreLocation::File(self.database_path()?))
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}
