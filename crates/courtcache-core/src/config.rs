//! Application configuration management.
//!
//! This module handles loading and saving the cache configuration: where the
//! database lives and how long cached data is retained.
//!
//! Configuration is stored at `~/.config/courtcache/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::retention::RetentionSetting;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "courtcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Database file name inside the cache directory
const DB_FILE: &str = "cache.redb";

/// Overrides the cache directory when set
pub const CACHE_DIR_ENV: &str = "COURTCACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub cache_dir: Option<PathBuf>,
    /// Prediction retention as stored: a day count, `all` or `off`.
    pub retention: Option<String>,
    /// Model performance retention. Kept for the settings screen; the
    /// cleanup sweep does not act on it.
    pub model_performance_retention: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Cache directory: `COURTCACHE_DIR`, then the configured override, then
    /// the platform cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(DB_FILE))
    }

    pub fn retention(&self) -> RetentionSetting {
        RetentionSetting::from_stored(self.retention.as_deref())
    }

    pub fn set_retention(&mut self, setting: RetentionSetting) {
        self.retention = Some(setting.to_string());
    }

    pub fn model_performance_retention(&self) -> RetentionSetting {
        RetentionSetting::from_stored(self.model_performance_retention.as_deref())
    }

    pub fn set_model_performance_retention(&mut self, setting: RetentionSetting) {
        self.model_performance_retention = Some(setting.to_string());
    }
}
