// chartsync - multi-chart dashboard coordination engine
//
// This library drives a set of chart widgets against a metrics data
// server: per-widget auto/pan/zoom state machines, globally synchronized
// pan-and-zoom and hover selection, viewport-aware refresh scheduling,
// and snapshot-backed offline replay.

pub mod config;
pub mod context;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod snapshot;
pub mod sync;
pub mod visibility;
pub mod widget;

// Re-export commonly used types
pub use config::{ConfigError, ConfigManager, DashboardConfig, RefreshStrategy, WidgetConfig};
pub use context::EngineContext;
pub use dashboard::Dashboard;
pub use data::{DataError, DataPayload, DataQuery, DataSource, HttpDataSource};
pub use error::{ChartSyncError, ChartSyncResult};
pub use render::{Renderer, RendererRegistry};
pub use scheduler::Refresher;
pub use visibility::{ScrollDirection, VisibilityTracker};
pub use widget::{ChartWidget, DisplayState, GestureKind, UpdateOutcome, WidgetMode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
