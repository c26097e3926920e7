//! Configuration for the dashboard engine.
//!
//! This module holds the typed configuration for refresh scheduling, global
//! synchronization, the data source, retry policy, snapshots and widget
//! declarations, plus the manager that loads and saves it as TOML.

pub mod loader;
pub mod validation;

use crate::data::{DataFormat, GroupingMethod};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub refresh: RefreshConfig,
    pub sync: SyncConfig,
    pub data: DataConfig,
    pub retry: RetryConfig,
    pub snapshot: SnapshotConfig,
    pub widgets: Vec<WidgetConfig>,
}

/// Refresh strategy selector for the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStrategy {
    /// Fire every due widget's update without waiting for completion.
    Parallel,
    /// One widget at a time, in visibility order.
    Sequential,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub strategy: RefreshStrategy,
    /// Pause between scheduler ticks, in ms.
    pub idle_between_ticks_ms: u64,
    /// Sequential mode: pause between widgets once the fast path is spent.
    pub idle_between_charts_ms: u64,
    /// Sequential mode: how long widgets run back to back before idling.
    pub fast_path_budget_ms: u64,
    /// Parallel mode: target wall time for one slice of concurrent fetches.
    pub slice_budget_ms: u64,
    pub stop_updates_when_focus_is_lost: bool,
    /// Abort in-flight fetches for widgets scrolled out of view.
    pub abort_on_scroll: bool,
    /// Point count used when a widget declares neither points nor width.
    pub default_points: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            strategy: RefreshStrategy::Parallel,
            idle_between_ticks_ms: 500,
            idle_between_charts_ms: 50,
            fast_path_budget_ms: 200,
            slice_budget_ms: 1_000,
            stop_updates_when_focus_is_lost: true,
            abort_on_scroll: false,
            default_points: 300,
        }
    }
}

/// Global pan/zoom and selection-sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub selection_enabled: bool,
    /// Debounce before a selection broadcast fans out to slaves.
    pub selection_debounce_ms: u64,
    /// Cool-down after `delay()` during which no new master is accepted.
    pub selection_cooldown_ms: u64,
    /// Debounce between a pan/zoom gesture and the forced refresh.
    pub pan_and_zoom_delay_ms: u64,
    /// Extend the rendered window past the requested one while panning.
    pub pan_padding: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            selection_enabled: true,
            selection_debounce_ms: 10,
            selection_cooldown_ms: 1_500,
            pan_and_zoom_delay_ms: 300,
            pan_padding: true,
        }
    }
}

/// Metrics server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub base_url: String,
    /// Default host for widgets that do not name one. Empty selects the
    /// server's own charts.
    pub default_host: String,
    pub timeout_ms: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:19999".to_string(),
            default_host: String::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Retry policy for transient fetch failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Snapshot replay settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Snapshot file to load at startup; when set, widgets read from it
    /// instead of fetching.
    pub path: Option<PathBuf>,
}

/// Declaration of one chart widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Unique id within the dashboard. Falls back to the chart id.
    pub id: String,
    pub chart: String,
    /// Host override; empty uses `DataConfig::default_host`.
    pub host: String,
    /// Rendering library name, resolved against the renderer registry.
    pub library: String,
    /// Window start in seconds; `<= 0` is relative to `before`.
    pub after: i64,
    /// Window end in seconds; `<= 0` is relative to now.
    pub before: i64,
    /// Explicit point count. When absent, derived from `width_px` and the
    /// renderer's pixels-per-point, else the scheduler default.
    pub points: Option<usize>,
    pub group: GroupingMethod,
    pub dimensions: Option<Vec<String>>,
    pub format: DataFormat,
    pub options: Vec<String>,
    /// Refresh interval override in ms; otherwise the chart's own
    /// reporting interval applies.
    pub update_every_ms: Option<u64>,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            chart: String::new(),
            host: String::new(),
            library: "table".to_string(),
            after: -600,
            before: 0,
            points: None,
            group: GroupingMethod::default(),
            dimensions: None,
            format: DataFormat::default(),
            options: Vec::new(),
            update_every_ms: None,
            width_px: 600,
            height_px: 200,
        }
    }
}

/// Configuration manager.
#[derive(Debug)]
pub struct ConfigManager {
    config: DashboardConfig,
    config_path: PathBuf,
    loader: loader::ConfigLoader,
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigManager {
    /// Create a manager, loading the file at `config_path` if it exists.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chartsync")
                .join("config.toml")
        });

        let loader = loader::ConfigLoader::new();
        let config = if config_path.exists() {
            let config = loader.load_from_file(&config_path)?;
            validation::validate(&config)?;
            config
        } else {
            DashboardConfig::default()
        };

        Ok(Self {
            config,
            config_path,
            loader,
        })
    }

    /// Reload configuration from file.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(self.config_path.clone()));
        }
        let config = self.loader.load_from_file(&self.config_path)?;
        validation::validate(&config)?;
        self.config = config;
        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.loader.save_to_file(&self.config, &self.config_path)
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Apply a mutation, re-validating the result.
    pub fn update<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut DashboardConfig),
    {
        updater(&mut self.config);
        validation::validate(&self.config)
    }
}
