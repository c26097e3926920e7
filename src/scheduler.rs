//! Refresher Loop
//!
//! Drives widget updates on a fixed tick. Each tick re-reads page state,
//! asks the visibility tracker for the widgets currently on screen, and
//! refreshes the eligible ones with one of two strategies: `parallel`
//! launches slices of concurrent fetches sized by the observed average
//! fetch time, `sequential` walks widgets one at a time with idle spacing
//! once the fast-path budget is spent. A pass is abandoned mid-flight when
//! the page loses focus, gets paused, or the widget set changes.

use crate::config::RefreshStrategy;
use crate::context::EngineContext;
use crate::widget::ChartWidget;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The scheduler. One per dashboard; `run` loops until `stop`.
#[derive(Debug)]
pub struct Refresher {
    ctx: Arc<EngineContext>,
    shutdown: CancellationToken,
}

impl Refresher {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled by `stop`; exposed so embedders can watch shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Tick until stopped.
    pub async fn run(&self) {
        let idle = Duration::from_millis(self.ctx.config.refresh.idle_between_ticks_ms);
        debug!(strategy = ?self.ctx.config.refresh.strategy, "refresher started");
        loop {
            if self.shutdown.is_cancelled() {
                debug!("refresher stopped");
                return;
            }
            self.tick().await;
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("refresher stopped");
                    return;
                }
                _ = sleep(idle) => {}
            }
        }
    }

    /// One scheduling pass. Public so embedders driving their own loop can
    /// call it directly.
    pub async fn tick(&self) {
        let page = &self.ctx.page;
        if page.is_paused() || page.is_pause_pending() {
            return;
        }
        if !page.has_focus() && self.ctx.config.refresh.stop_updates_when_focus_is_lost {
            trace!("page unfocused, tick skipped");
            return;
        }
        // The stale flag covers widget-set changes since the last scan.
        page.clear_widgets_stale();

        let widgets = self.ctx.visibility.visible_widgets().await;
        if widgets.is_empty() {
            return;
        }
        match self.ctx.config.refresh.strategy {
            RefreshStrategy::Parallel => self.tick_parallel(widgets).await,
            RefreshStrategy::Sequential => self.tick_sequential(widgets).await,
        }
    }

    /// Page-state checks applied between widgets within one pass.
    fn pass_interrupted(&self) -> bool {
        let page = &self.ctx.page;
        self.shutdown.is_cancelled()
            || page.is_paused()
            || page.is_pause_pending()
            || page.widgets_stale()
            || (!page.has_focus() && self.ctx.config.refresh.stop_updates_when_focus_is_lost)
    }

    /// Walk widgets in page order. Ineligible widgets cost nothing; once
    /// the fast-path budget is exhausted, each refresh is followed by idle
    /// spacing so a long page never monopolizes the runtime.
    async fn tick_sequential(&self, widgets: Vec<Arc<ChartWidget>>) {
        let idle = Duration::from_millis(self.ctx.config.refresh.idle_between_charts_ms);
        let fast_budget = Duration::from_millis(self.ctx.config.refresh.fast_path_budget_ms);
        let started = Instant::now();

        for widget in widgets {
            if self.pass_interrupted() {
                trace!("sequential pass interrupted");
                return;
            }
            if !widget.can_be_auto_refreshed().await {
                continue;
            }
            widget.update_chart().await;
            if started.elapsed() >= fast_budget {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = sleep(idle) => {}
                }
            }
        }
    }

    /// Refresh eligible widgets in concurrent slices. The slice size is the
    /// per-slice time budget divided by the observed average fetch time, so
    /// a slow server automatically narrows how much launches at once.
    /// Updates are spawned, never awaited: a hung fetch occupies its own
    /// widget's fetch gate, not the rest of the pass.
    async fn tick_parallel(&self, widgets: Vec<Arc<ChartWidget>>) {
        let mut eligible = Vec::new();
        for widget in widgets {
            if widget.can_be_auto_refreshed().await {
                eligible.push(widget);
            }
        }
        if eligible.is_empty() {
            return;
        }

        let average_ms = self.ctx.timings.average_ms().max(1);
        let slice = ((self.ctx.config.refresh.slice_budget_ms / average_ms).max(1)) as usize;
        let pacing = Duration::from_millis(self.ctx.config.refresh.slice_budget_ms);
        trace!(eligible = eligible.len(), slice, "parallel pass");

        let mut chunks = eligible.chunks(slice).peekable();
        while let Some(chunk) = chunks.next() {
            if self.pass_interrupted() {
                trace!("parallel pass interrupted");
                return;
            }
            for widget in chunk {
                let widget = widget.clone();
                tokio::spawn(async move {
                    widget.update_chart().await;
                });
            }
            if chunks.peek().is_some() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    _ = sleep(pacing) => {}
                }
            }
        }
    }
}
