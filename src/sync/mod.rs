//! Global Synchronization Coordinators
//!
//! Two per-dashboard context objects coordinate cross-widget state: one
//! elects a master of the shared time viewport (`PanAndZoom`), the other a
//! master of point-in-time hover selection (`SelectionSync`). Both hold
//! only weak widget references and are written exclusively by the current
//! master's gesture path; every other widget reads them on scheduler ticks.

pub mod pan_zoom;
pub mod selection;

pub use pan_zoom::{PanAndZoom, ViewportCallback};
pub use selection::SelectionSync;

/// Wall-clock milliseconds. Coordinators use this for generation counters
/// and cool-down arithmetic.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
