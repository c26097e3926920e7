//! Dashboard Facade
//!
//! Ties the engine together for an embedding application: builds the
//! shared context around a data source, creates widgets from
//! configuration, relays page-level events (focus, scroll, pause) into
//! the context, and owns the refresher.

use crate::config::{DashboardConfig, WidgetConfig};
use crate::context::EngineContext;
use crate::data::{DataError, HttpDataSource, HttpSourceConfig};
use crate::error::ChartSyncResult;
use crate::scheduler::Refresher;
use crate::visibility::ScrollDirection;
use crate::widget::ChartWidget;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// A running dashboard: one context, one widget set, one refresher.
#[derive(Debug)]
pub struct Dashboard {
    ctx: Arc<EngineContext>,
    widgets: RwLock<Vec<Arc<ChartWidget>>>,
    refresher: Refresher,
}

impl Dashboard {
    /// Build a dashboard fetching over HTTP per `config.data`.
    pub fn new(config: DashboardConfig) -> Result<Self, DataError> {
        let source = HttpDataSource::new(HttpSourceConfig {
            base_url: config.data.base_url.clone(),
            timeout: Duration::from_millis(config.data.timeout_ms),
        })?;
        Ok(Self::with_source(config, Arc::new(source), true))
    }

    /// Build a dashboard around an arbitrary data source. Embedders with a
    /// real viewport-intersection signal pass `fallback_all_visible =
    /// false` and drive `set_visible` themselves.
    pub fn with_source(
        config: DashboardConfig,
        source: Arc<dyn crate::data::DataSource>,
        fallback_all_visible: bool,
    ) -> Self {
        let ctx = EngineContext::new(config, source, fallback_all_visible);
        Self {
            refresher: Refresher::new(ctx.clone()),
            widgets: RwLock::new(Vec::new()),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn refresher(&self) -> &Refresher {
        &self.refresher
    }

    /// Create every widget declared in the configuration, then load the
    /// configured snapshot, if any.
    pub async fn init(&self) -> ChartSyncResult<()> {
        let widget_configs = self.ctx.config.widgets.clone();
        for widget_config in widget_configs {
            self.create_widget(widget_config).await;
        }
        if let Some(path) = self.ctx.config.snapshot.path.clone() {
            self.load_snapshot(&path).await?;
        }
        Ok(())
    }

    /// Create and register one widget. Never fails: a bad declaration
    /// (unknown library, missing chart id) yields a disabled widget with
    /// an inline error display, leaving every other widget untouched.
    pub async fn create_widget(&self, config: WidgetConfig) -> Arc<ChartWidget> {
        let widget = ChartWidget::new(config, self.ctx.clone()).await;
        self.ctx.visibility.register(&widget).await;
        self.widgets.write().await.push(widget.clone());
        self.ctx.page.mark_widgets_stale();
        info!(widget = %widget.key(), "widget created");
        widget
    }

    /// Remove a widget by key. Its in-flight fetch is aborted and the
    /// coordinators drop it naturally through their weak references.
    pub async fn remove_widget(&self, key: &str) -> bool {
        let removed = {
            let mut widgets = self.widgets.write().await;
            let before = widgets.len();
            widgets.retain(|w| {
                if w.key() == key {
                    w.abort_fetch();
                    false
                } else {
                    true
                }
            });
            before != widgets.len()
        };
        if removed {
            self.ctx.page.mark_widgets_stale();
        }
        removed
    }

    pub async fn widget(&self, key: &str) -> Option<Arc<ChartWidget>> {
        self.widgets.read().await.iter().find(|w| w.key() == key).cloned()
    }

    pub async fn widgets(&self) -> Vec<Arc<ChartWidget>> {
        self.widgets.read().await.clone()
    }

    // ------------------------------------------------------------------
    // page events
    // ------------------------------------------------------------------

    /// Relay window focus. Losing focus stops autorefresh on the next
    /// tick when so configured; regaining it resumes naturally.
    pub fn set_focus(&self, focused: bool) {
        self.ctx.page.set_focus(focused);
    }

    /// Relay a scroll gesture. Advances the scroll generation and, when
    /// configured, aborts fetches of widgets that scrolled off screen.
    pub async fn note_scroll(&self, direction: ScrollDirection) {
        self.ctx.visibility.note_scroll(direction).await;
        if self.ctx.config.refresh.abort_on_scroll {
            for widget in self.ctx.visibility.all_widgets().await {
                if !widget.is_visible().await {
                    widget.abort_fetch();
                }
            }
        }
    }

    pub fn pause(&self) {
        self.ctx.page.set_paused(true);
    }

    pub fn resume(&self) {
        self.ctx.page.set_paused(false);
    }

    /// Clear all global state: pan/zoom mastership, selection, in-flight
    /// fetches. Widgets fall back to `auto` and catch up on the next tick.
    pub async fn reset_all(&self) {
        self.ctx.pan_and_zoom.clear_master().await;
        self.ctx.selection.stop().await;
        for widget in self.widgets.read().await.iter() {
            widget.abort_fetch();
        }
    }

    // ------------------------------------------------------------------
    // snapshots
    // ------------------------------------------------------------------

    /// Load a snapshot file; until unloaded, widgets read from it instead
    /// of fetching.
    pub async fn load_snapshot(&self, path: &Path) -> ChartSyncResult<()> {
        self.ctx.snapshot.load_from_file(path).await?;
        info!(path = %path.display(), "snapshot loaded");
        Ok(())
    }

    pub async fn unload_snapshot(&self) {
        self.ctx.snapshot.unload().await;
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Run the refresher until `shutdown` is called.
    pub async fn run(&self) {
        self.refresher.run().await;
    }

    pub fn shutdown(&self) {
        self.refresher.stop();
    }
}
