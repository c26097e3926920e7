//! Shared Engine Context
//!
//! One `EngineContext` is constructed per dashboard and handed to every
//! widget at creation time. It replaces the ambient globals of the original
//! system with explicit dependency injection, which is also what makes the
//! widget state machine unit-testable against a mock data source.

use crate::config::DashboardConfig;
use crate::data::DataSource;
use crate::registry::ChartRegistry;
use crate::render::RendererRegistry;
use crate::snapshot::SnapshotStore;
use crate::sync::{PanAndZoom, SelectionSync};
use crate::visibility::VisibilityTracker;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Page-level inputs the scheduler consults every tick. All flags are set
/// by the embedding application through `Dashboard`.
#[derive(Debug, Default)]
pub struct PageState {
    focus_lost: AtomicBool,
    paused: AtomicBool,
    /// An external pause callback has been invoked and has not completed.
    pause_pending: AtomicBool,
    /// The widget set changed; the scheduler must rescan before resuming.
    widgets_stale: AtomicBool,
}

impl PageState {
    pub fn has_focus(&self) -> bool {
        !self.focus_lost.load(Ordering::Relaxed)
    }

    pub fn set_focus(&self, focused: bool) {
        self.focus_lost.store(!focused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_pause_pending(&self) -> bool {
        self.pause_pending.load(Ordering::Relaxed)
    }

    pub fn set_pause_pending(&self, pending: bool) {
        self.pause_pending.store(pending, Ordering::Relaxed);
    }

    pub fn widgets_stale(&self) -> bool {
        self.widgets_stale.load(Ordering::Relaxed)
    }

    pub fn mark_widgets_stale(&self) {
        self.widgets_stale.store(true, Ordering::Relaxed);
    }

    pub fn clear_widgets_stale(&self) {
        self.widgets_stale.store(false, Ordering::Relaxed);
    }
}

/// Rolling average of data-fetch durations, shared between widgets (who
/// record) and the scheduler (who throttles slice sizes with it).
#[derive(Debug, Default)]
pub struct FetchTimings {
    total_ms: AtomicU64,
    count: AtomicU64,
}

impl FetchTimings {
    pub fn record(&self, elapsed: Duration) {
        self.total_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Average fetch duration in ms; zero before the first sample.
    pub fn average_ms(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.total_ms.load(Ordering::Relaxed) / count
    }

    pub fn samples(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Everything widgets and the scheduler share within one dashboard.
#[derive(Debug)]
pub struct EngineContext {
    pub config: DashboardConfig,
    pub source: Arc<dyn DataSource>,
    pub registry: ChartRegistry,
    pub renderers: RendererRegistry,
    pub pan_and_zoom: PanAndZoom,
    pub selection: Arc<SelectionSync>,
    pub visibility: Arc<VisibilityTracker>,
    pub snapshot: SnapshotStore,
    pub timings: FetchTimings,
    pub page: PageState,
}

impl EngineContext {
    /// Build a context around `source`. `fallback_all_visible` selects the
    /// visibility tracker's no-intersection-signal mode.
    pub fn new(
        config: DashboardConfig,
        source: Arc<dyn DataSource>,
        fallback_all_visible: bool,
    ) -> Arc<Self> {
        let visibility = Arc::new(VisibilityTracker::new(fallback_all_visible));
        let selection = Arc::new(SelectionSync::new(&config.sync, visibility.clone()));
        Arc::new(Self {
            registry: ChartRegistry::new(source.clone()),
            renderers: RendererRegistry::with_defaults(),
            pan_and_zoom: PanAndZoom::new(),
            selection,
            visibility,
            snapshot: SnapshotStore::new(),
            timings: FetchTimings::default(),
            page: PageState::default(),
            config,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_state_defaults() {
        let page = PageState::default();
        assert!(page.has_focus());
        assert!(!page.is_paused());
        assert!(!page.is_pause_pending());
        assert!(!page.widgets_stale());
    }

    #[test]
    fn test_fetch_timings_average() {
        let timings = FetchTimings::default();
        assert_eq!(timings.average_ms(), 0);
        timings.record(Duration::from_millis(100));
        timings.record(Duration::from_millis(300));
        assert_eq!(timings.average_ms(), 200);
        assert_eq!(timings.samples(), 2);
    }
}
