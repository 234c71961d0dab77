//! JSON Configuration Management
//!
//! Handles reading and writing the relay configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::RelayConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for the relay settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: RelayConfig,
}

impl ConfigService {
    /// Load the config at the default location, creating defaults if absent
    pub fn new() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Load the config at `path`, creating defaults if absent
    pub fn open(config_path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = config_path.into();
        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            if let Some(parent) = config_path.parent() {
                ensure_dir(parent)?;
            }
            let default_config = RelayConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<RelayConfig> {
        let content = fs::read_to_string(path)?;
        let config: RelayConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &RelayConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &RelayConfig {
        &self.config
    }

    /// Consume the service, returning the configuration
    pub fn into_config(self) -> RelayConfig {
        self.config
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Override the listen address (CLI flag); validated but not persisted
    pub fn override_listen_addr(&mut self, listen_addr: &str) -> AppResult<()> {
        let mut updated = self.config.clone();
        updated.listen_addr = listen_addr.to_string();
        updated.validate().map_err(AppError::validation)?;
        self.config = updated;
        Ok(())
    }
}
