//! Configuration loading and saving utilities.

use crate::config::{ConfigError, DashboardConfig};
use std::path::Path;

/// Configuration loader/saver.
#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load_from_file(&self, path: &Path) -> Result<DashboardConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DashboardConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, config: &DashboardConfig, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
