//! Crate-wide error type.
//!
//! Each module defines its own error enum; this umbrella wraps them for
//! callers that cross module boundaries, such as the dashboard facade and
//! the CLI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartSyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Data source error: {0}")]
    Data(#[from] crate::data::DataError),

    #[error("Widget error: {0}")]
    Widget(#[from] crate::widget::WidgetError),

    #[error("Render error: {0}")]
    Render(#[from] crate::render::RenderError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] crate::snapshot::SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ChartSyncResult<T> = Result<T, ChartSyncError>;
