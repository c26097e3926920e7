//! Chart Widget State Machine
//!
//! One `ChartWidget` per on-page chart. It owns configuration parsing, the
//! render surface lifecycle, data retrieval, hand-off to the rendering
//! library, legend state, and participation in the global pan/zoom and
//! selection coordinators.
//!
//! Modes: `auto` follows the live tail and refreshes on the chart's own
//! interval; `pan` and `zoom` pin a user-forced window, disable
//! autorefresh, and arm a debounced forced update. A reset returns to
//! `auto`.
//!
//! All failures are contained here: the scheduler and the coordinators
//! never see an error from a widget update.

use crate::config::WidgetConfig;
use crate::context::EngineContext;
use crate::data::{resolve_window, ChartMetadata, DataError, DataPayload, DataQuery};
use crate::render::{Legend, RenderContext, RenderError, RenderedFrame, Renderer};
use crate::snapshot::SnapshotKey;
use crate::sync::now_ms;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Viewport mode of one widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetMode {
    /// Follow the live tail, autorefresh on a timer.
    Auto,
    /// User dragged; fixed forced window until reset.
    Pan,
    /// User zoomed; fixed forced window until reset.
    Zoom,
}

/// User gesture kinds that force a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Pan,
    Zoom,
}

/// What the widget currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    /// No render yet.
    Loading,
    /// Last update rendered successfully.
    Rendered,
    /// Valid response with zero points; distinct from an error.
    Empty,
    /// Permanent error display. The widget stays live for resize and
    /// mode changes.
    Failed(String),
}

/// Outcome of one `update_chart` call.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated,
    /// A fetch was already in flight; nothing was done.
    AlreadyRunning,
    /// The widget is disabled.
    NotEligible,
    /// Valid response, zero data points.
    Empty,
    /// The fetch was cancelled; does not consume retry budget.
    Aborted,
    Failed(WidgetError),
}

/// Widget-boundary error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("Chart library unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("Chart metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("Data fetch failed: {0}")]
    FetchFailed(DataError),

    #[error("Rendering failed: {0}")]
    RenderFailed(#[from] RenderError),

    #[error("Invalid widget configuration: {0}")]
    Configuration(String),
}

/// Counters kept per widget.
#[derive(Debug, Clone, Default)]
pub struct WidgetMetrics {
    pub updates: u64,
    pub failures: u64,
    pub aborts: u64,
    pub empty_results: u64,
    /// Pan/zoom resets received, e.g. on mastership handoff.
    pub resets: u64,
}

#[derive(Debug)]
struct WidgetState {
    mode: WidgetMode,
    force_after_ms: Option<i64>,
    force_before_ms: Option<i64>,
    force_update_at: Option<Instant>,

    view_after_ms: i64,
    view_before_ms: i64,
    data_after_ms: i64,
    data_before_ms: i64,
    data_points: usize,
    data_update_every_ms: u64,
    first_entry_ms: i64,
    last_entry_ms: i64,

    enabled: bool,
    paused: bool,
    selected: bool,
    chart_created: bool,
    surface_created: bool,
    failed: bool,
    visible: bool,
    visibility_stamp: u64,

    display: DisplayState,
    retries_left: u32,
    /// Pan/zoom generation this widget last caught up to.
    pan_zoom_seq: i64,
    updates: u64,
    last_autorefresh: Option<Instant>,

    last_payload: Option<DataPayload>,
    frame: Option<RenderedFrame>,
    legend: Option<Legend>,
    width_px: u32,
    height_px: u32,
    metrics: WidgetMetrics,
}

impl WidgetState {
    fn new(config: &WidgetConfig, max_retries: u32) -> Self {
        Self {
            mode: WidgetMode::Auto,
            force_after_ms: None,
            force_before_ms: None,
            force_update_at: None,
            view_after_ms: 0,
            view_before_ms: 0,
            data_after_ms: 0,
            data_before_ms: 0,
            data_points: 0,
            data_update_every_ms: 0,
            first_entry_ms: 0,
            last_entry_ms: 0,
            enabled: true,
            paused: false,
            selected: false,
            chart_created: false,
            surface_created: false,
            failed: false,
            visible: false,
            visibility_stamp: 0,
            display: DisplayState::Loading,
            retries_left: max_retries,
            pan_zoom_seq: 0,
            updates: 0,
            last_autorefresh: None,
            last_payload: None,
            frame: None,
            legend: None,
            width_px: config.width_px,
            height_px: config.height_px,
            metrics: WidgetMetrics::default(),
        }
    }
}

/// One chart widget. Shared as `Arc`; interior state behind an async lock,
/// with the fetch gate as a plain atomic so re-entrancy checks never wait.
pub struct ChartWidget {
    id: Uuid,
    key: String,
    host: String,
    chart: String,
    config: WidgetConfig,
    renderer: Option<Arc<dyn Renderer>>,
    ctx: Arc<EngineContext>,
    fetching: AtomicBool,
    fetch_cancel: Mutex<Option<CancellationToken>>,
    state: RwLock<WidgetState>,
}

/// Releases the fetch gate and drops the cancellation token on every exit
/// path of `update_chart`.
struct FetchGuard<'a> {
    widget: &'a ChartWidget,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.widget.fetch_cancel.lock() {
            *slot = None;
        }
        self.widget.fetching.store(false, Ordering::Release);
    }
}

impl ChartWidget {
    /// Build a widget. Configuration errors (unknown rendering library,
    /// missing chart id) disable this widget and set an inline error
    /// display without affecting any other widget.
    pub async fn new(config: WidgetConfig, ctx: Arc<EngineContext>) -> Arc<Self> {
        let host = if config.host.is_empty() {
            ctx.config.data.default_host.clone()
        } else {
            config.host.clone()
        };
        let key = if config.id.is_empty() { config.chart.clone() } else { config.id.clone() };
        let renderer = ctx.renderers.get(&config.library).await;

        let mut state = WidgetState::new(&config, ctx.config.retry.max_retries);
        if config.chart.is_empty() {
            state.enabled = false;
            state.failed = true;
            state.display = DisplayState::Failed("missing chart id".to_string());
            warn!(widget = %key, "widget disabled: missing chart id");
        } else if renderer.is_none() {
            state.enabled = false;
            state.failed = true;
            state.display =
                DisplayState::Failed(format!("chart library '{}' is not registered", config.library));
            warn!(widget = %key, library = %config.library, "widget disabled: unknown rendering library");
        }

        Arc::new(Self {
            id: Uuid::new_v4(),
            key,
            host,
            chart: config.chart.clone(),
            config,
            renderer,
            ctx,
            fetching: AtomicBool::new(false),
            fetch_cancel: Mutex::new(None),
            state: RwLock::new(state),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    pub fn supports_selection(&self) -> bool {
        self.renderer.as_ref().map(|r| r.supports_selection()).unwrap_or(false)
    }

    fn snapshot_key(&self) -> SnapshotKey {
        SnapshotKey {
            chart: self.chart.clone(),
            library: self.config.library.clone(),
            dimensions: self.config.dimensions.clone(),
            options: self.config.options.clone(),
        }
    }

    /// Effective refresh interval: widget override, else the interval the
    /// data actually reported, else one second until first data arrives.
    fn effective_update_every(&self, state: &WidgetState) -> u64 {
        self.config
            .update_every_ms
            .unwrap_or(if state.data_update_every_ms == 0 {
                1_000
            } else {
                state.data_update_every_ms
            })
            .max(1)
    }

    /// Point count for the next fetch: explicit config, else derived from
    /// widget width and the renderer's point density, else the default.
    fn effective_points(&self) -> usize {
        if let Some(points) = self.config.points {
            return points;
        }
        if let Some(renderer) = &self.renderer {
            let ppp = renderer.pixels_per_point().max(1);
            let derived = (self.config.width_px / ppp) as usize;
            if derived > 0 {
                return derived;
            }
        }
        self.ctx.config.refresh.default_points
    }

    // ------------------------------------------------------------------
    // visibility / lifecycle flags
    // ------------------------------------------------------------------

    /// Called by the visibility tracker; stamps the cached flag with the
    /// scroll generation it was computed at.
    pub async fn mark_visible(&self, visible: bool, scroll_generation: u64) {
        let mut s = self.state.write().await;
        s.visible = visible;
        s.visibility_stamp = scroll_generation;
    }

    pub async fn is_visible(&self) -> bool {
        self.state.read().await.visible
    }

    pub async fn pause(&self) {
        self.state.write().await.paused = true;
    }

    pub async fn unpause(&self) {
        self.state.write().await.paused = false;
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// Recreate the surface scaffold after `destroy_surface`. Updates do
    /// this implicitly; embedders call it to re-host a widget eagerly.
    pub async fn create_surface(&self) {
        self.state.write().await.surface_created = true;
    }

    /// Tear down the render surface without replacing the state object.
    /// Viewport and mode survive; the next update recreates the chart.
    pub async fn destroy_surface(&self) {
        let mut s = self.state.write().await;
        s.surface_created = false;
        s.chart_created = false;
        s.frame = None;
        s.legend = None;
        if !s.failed {
            s.display = DisplayState::Loading;
        }
    }

    pub async fn resize(&self, width_px: u32, height_px: u32) {
        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => return,
        };
        let mut s = self.state.write().await;
        s.width_px = width_px;
        s.height_px = height_px;
        if let Some(frame) = s.frame.as_mut() {
            renderer.resize(frame, width_px, height_px);
        }
    }

    // ------------------------------------------------------------------
    // scheduling decision
    // ------------------------------------------------------------------

    /// Whether the scheduler should refresh this widget now. No side
    /// effects; called every tick.
    pub async fn can_be_auto_refreshed(&self) -> bool {
        if self.renderer.is_none() {
            return false;
        }
        if self.is_fetching() {
            return false;
        }

        let (id, synced_seq, last, every, rendered) = {
            let s = self.state.read().await;
            if !s.enabled || !s.visible || s.paused || s.selected {
                return false;
            }
            if !self.ctx.page.has_focus()
                && self.ctx.config.refresh.stop_updates_when_focus_is_lost
                && s.updates > 0
            {
                return false;
            }
            let forced_due = s
                .force_update_at
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false);
            if forced_due {
                return true;
            }
            // A permanent error stops autorefresh; a new gesture re-arms it.
            if s.failed {
                return false;
            }
            (
                self.id,
                s.pan_zoom_seq,
                s.last_autorefresh,
                self.effective_update_every(&s),
                s.updates > 0,
            )
        };

        // Snapshot data never changes; one render is enough.
        if rendered && self.ctx.snapshot.is_active().await {
            return false;
        }

        if self.ctx.pan_and_zoom.is_active().await {
            // Catch up with the synchronized viewport, or hold still.
            return self.ctx.pan_and_zoom.should_be_auto_refreshed(id, synced_seq).await;
        }

        match last {
            None => true,
            Some(at) => at.elapsed() >= Duration::from_millis(every),
        }
    }

    // ------------------------------------------------------------------
    // data update
    // ------------------------------------------------------------------

    /// Run one full update: metadata, fetch (or snapshot read), viewport
    /// recomputation, render dispatch. Re-entrant calls while a fetch is
    /// in flight are no-ops.
    pub async fn update_chart(self: &Arc<Self>) -> UpdateOutcome {
        if self
            .fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return UpdateOutcome::AlreadyRunning;
        }
        let _guard = FetchGuard { widget: self };

        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => {
                return UpdateOutcome::Failed(WidgetError::LibraryUnavailable(
                    self.config.library.clone(),
                ))
            }
        };
        if !self.state.read().await.enabled {
            return UpdateOutcome::NotEligible;
        }

        // One-time, per-library lazy initialization.
        if let Err(e) = self.ctx.renderers.get_initialized(renderer.name()).await {
            self.fail_permanently(e.to_string()).await;
            return UpdateOutcome::Failed(WidgetError::RenderFailed(e));
        }

        // Chart metadata, fetched once per (host, chart) via the registry.
        let metadata = match self.ctx.registry.metadata(&self.host, &self.chart).await {
            Ok(m) => m,
            Err(DataError::Aborted) => {
                self.state.write().await.metrics.aborts += 1;
                return UpdateOutcome::Aborted;
            }
            Err(e @ DataError::ChartNotFound(_)) | Err(e @ DataError::Parse(_)) => {
                // Non-retryable: no such chart on this server.
                let message = e.to_string();
                self.disable_with_error(message.clone()).await;
                return UpdateOutcome::Failed(WidgetError::MetadataNotFound(message));
            }
            Err(e) => return self.note_fetch_failure(e).await,
        };

        // Read the generation before the window: a mastership change in
        // between leaves this widget stale and due for another refresh,
        // never wrongly marked caught-up.
        let pan_seq = self.ctx.pan_and_zoom.seq().await;
        let (requested_after, requested_before, query) = self.build_query(&metadata).await;

        let payload = if self.ctx.snapshot.is_active().await {
            match self.ctx.snapshot.payload(&self.snapshot_key()).await {
                Some(p) => p,
                None => {
                    // Snapshot loaded but has nothing for this widget.
                    return self.note_empty().await;
                }
            }
        } else {
            let cancel = CancellationToken::new();
            if let Ok(mut slot) = self.fetch_cancel.lock() {
                *slot = Some(cancel.clone());
            }
            let started = Instant::now();
            let result = self
                .ctx
                .source
                .query(&self.host, &self.chart, &query, cancel)
                .await;
            self.ctx.timings.record(started.elapsed());
            match result {
                Ok(p) => p,
                Err(DataError::Aborted) => {
                    debug!(widget = %self.key, "fetch aborted");
                    self.state.write().await.metrics.aborts += 1;
                    return UpdateOutcome::Aborted;
                }
                Err(e) => return self.note_fetch_failure(e).await,
            }
        };

        if payload.is_empty() {
            return self.note_empty().await;
        }

        match self
            .apply_payload(renderer, &metadata, payload, requested_after, requested_before, pan_seq)
            .await
        {
            Ok(()) => UpdateOutcome::Updated,
            Err(e) => {
                self.fail_permanently(e.to_string()).await;
                UpdateOutcome::Failed(e)
            }
        }
    }

    /// Compute the requested window and the (possibly padded) fetch query.
    /// Window priority: this widget's own forced window, then the global
    /// pan/zoom window it must catch up to, then the configured default.
    async fn build_query(&self, metadata: &ChartMetadata) -> (i64, i64, DataQuery) {
        let now = now_ms();
        // Read the coordinator before taking the state lock; the
        // coordinator's reset path locks in the opposite order.
        let global_window = self.ctx.pan_and_zoom.window().await;
        let s = self.state.read().await;
        let (requested_after, requested_before) = match (s.force_after_ms, s.force_before_ms) {
            (Some(a), Some(b)) => (a, b),
            _ => match global_window {
                Some((a, b)) => (a, b),
                None => resolve_window(self.config.after * 1000, self.config.before * 1000, now),
            },
        };

        // While panning, fetch wider than the view so small follow-up drags
        // land inside already-fetched bounds.
        let (mut fetch_after, mut fetch_before) = (requested_after, requested_before);
        if s.mode == WidgetMode::Pan && self.ctx.config.sync.pan_padding {
            let pad = (requested_before - requested_after) / 4;
            fetch_after -= pad;
            fetch_before += pad;
            let (first, last) = metadata.retention();
            if first != 0 {
                fetch_after = fetch_after.max(first);
            }
            if last != 0 {
                fetch_before = fetch_before.min(last);
            }
        }

        let query = DataQuery {
            after_ms: fetch_after,
            before_ms: fetch_before,
            points: self.effective_points(),
            group: self.config.group,
            dimensions: self.config.dimensions.clone(),
            format: self.config.format,
            options: self.config.options.clone(),
        };
        (requested_after, requested_before, query)
    }

    /// Store the fetched series, recompute the rendered viewport clamped to
    /// the served bounds, and dispatch create-or-update to the renderer.
    async fn apply_payload(
        &self,
        renderer: Arc<dyn Renderer>,
        metadata: &ChartMetadata,
        payload: DataPayload,
        requested_after: i64,
        requested_before: i64,
        pan_zoom_seq: i64,
    ) -> Result<(), WidgetError> {
        let mut s = self.state.write().await;

        // Some servers answer with the window bounds swapped; normalize
        // before clamping, which requires an ordered range.
        let (served_after, served_before) = if payload.after_ms <= payload.before_ms {
            (payload.after_ms, payload.before_ms)
        } else {
            (payload.before_ms, payload.after_ms)
        };
        s.data_after_ms = served_after;
        s.data_before_ms = served_before;
        s.data_points = payload.points();
        s.data_update_every_ms = payload.update_every_ms;
        s.first_entry_ms = metadata.first_entry_ms;
        s.last_entry_ms = metadata.last_entry_ms;

        // The rendered window never escapes what was actually served.
        let mut view_after = requested_after.clamp(served_after, served_before);
        let mut view_before = requested_before.clamp(served_after, served_before);
        if view_after > view_before {
            std::mem::swap(&mut view_after, &mut view_before);
        }
        s.view_after_ms = view_after;
        s.view_before_ms = view_before;

        if !s.surface_created {
            s.surface_created = true;
        }

        let render_ctx = RenderContext {
            chart_id: metadata.id.clone(),
            title: metadata.title.clone(),
            units: metadata.units.clone(),
            view_after_ms: view_after,
            view_before_ms: view_before,
            width_px: s.width_px,
            height_px: s.height_px,
        };

        if s.chart_created {
            match s.frame.as_mut() {
                Some(frame) => renderer.update(frame, &render_ctx, &payload)?,
                None => s.frame = Some(renderer.create(&render_ctx, &payload)?),
            }
        } else {
            s.frame = Some(renderer.create(&render_ctx, &payload)?);
            s.chart_created = true;
        }

        if renderer.supports_legend() {
            s.legend = Some(Legend::from_payload(&metadata.title, &metadata.units, &payload));
        }

        s.last_payload = Some(payload);
        s.display = DisplayState::Rendered;
        s.failed = false;
        s.retries_left = self.ctx.config.retry.max_retries;
        s.updates += 1;
        s.metrics.updates += 1;
        s.last_autorefresh = Some(Instant::now());
        s.pan_zoom_seq = pan_zoom_seq;
        if s.force_update_at.map(|d| Instant::now() >= d).unwrap_or(false) {
            s.force_update_at = None;
        }
        Ok(())
    }

    async fn note_empty(&self) -> UpdateOutcome {
        let mut s = self.state.write().await;
        s.display = DisplayState::Empty;
        s.metrics.empty_results += 1;
        s.updates += 1;
        s.last_autorefresh = Some(Instant::now());
        UpdateOutcome::Empty
    }

    /// Transient failure path: consume retry budget while keeping the
    /// last-known-good display, then fall to a permanent error.
    async fn note_fetch_failure(&self, error: DataError) -> UpdateOutcome {
        let mut s = self.state.write().await;
        s.metrics.failures += 1;
        s.last_autorefresh = Some(Instant::now());
        if error.is_retryable() && s.retries_left > 0 {
            s.retries_left -= 1;
            warn!(widget = %self.key, retries_left = s.retries_left, %error, "fetch failed, will retry");
        } else {
            s.failed = true;
            s.display = DisplayState::Failed(error.to_string());
            s.force_update_at = None;
            warn!(widget = %self.key, %error, "fetch failed permanently");
        }
        UpdateOutcome::Failed(WidgetError::FetchFailed(error))
    }

    async fn fail_permanently(&self, message: String) {
        let mut s = self.state.write().await;
        s.failed = true;
        s.display = DisplayState::Failed(message);
        s.force_update_at = None;
    }

    async fn disable_with_error(&self, message: String) {
        let mut s = self.state.write().await;
        s.enabled = false;
        s.failed = true;
        s.display = DisplayState::Failed(message);
    }

    /// Re-render from the last payload without fetching. Returns false if
    /// there is nothing to redraw. Idempotent: repeated calls with no new
    /// data leave frame content and legend labels unchanged.
    pub async fn redraw_chart(&self) -> bool {
        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => return false,
        };
        let mut s = self.state.write().await;
        let payload = match s.last_payload.clone() {
            Some(p) => p,
            None => return false,
        };
        let title = s.legend.as_ref().map(|l| l.title.clone()).unwrap_or_else(|| self.chart.clone());
        let units = s.legend.as_ref().map(|l| l.units.clone()).unwrap_or_default();
        let render_ctx = RenderContext {
            chart_id: self.chart.clone(),
            title: title.clone(),
            units: units.clone(),
            view_after_ms: s.view_after_ms,
            view_before_ms: s.view_before_ms,
            width_px: s.width_px,
            height_px: s.height_px,
        };
        let ok = match s.frame.as_mut() {
            Some(frame) => renderer.update(frame, &render_ctx, &payload).is_ok(),
            None => match renderer.create(&render_ctx, &payload) {
                Ok(frame) => {
                    s.frame = Some(frame);
                    true
                }
                Err(_) => false,
            },
        };
        if ok && renderer.supports_legend() {
            s.legend = Some(Legend::from_payload(&title, &units, &payload));
        }
        ok
    }

    // ------------------------------------------------------------------
    // pan / zoom
    // ------------------------------------------------------------------

    /// Apply a user drag or zoom gesture. Movements and duration changes
    /// both below twice the chart's reporting interval are mouse noise and
    /// rejected without touching any state. An accepted gesture pins the
    /// window, arms the debounced forced update, and promotes this widget
    /// to pan/zoom master.
    pub async fn update_pan_or_zoom(
        self: &Arc<Self>,
        kind: GestureKind,
        after_ms: i64,
        before_ms: i64,
    ) -> bool {
        if before_ms <= after_ms {
            return false;
        }
        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => return false,
        };
        if !renderer.supports_pan_and_zoom() {
            return false;
        }

        {
            let s = self.state.read().await;
            if !s.enabled {
                return false;
            }
            let threshold = 2 * self.effective_update_every(&s) as i64;
            let new_duration = before_ms - after_ms;
            if new_duration < threshold {
                return false;
            }
            if s.view_before_ms > s.view_after_ms {
                let movement = (after_ms - s.view_after_ms)
                    .abs()
                    .max((before_ms - s.view_before_ms).abs());
                let duration_delta = (new_duration - (s.view_before_ms - s.view_after_ms)).abs();
                if movement < threshold && duration_delta < threshold {
                    return false;
                }
            }
        }

        {
            let mut s = self.state.write().await;
            s.mode = match kind {
                GestureKind::Pan => WidgetMode::Pan,
                GestureKind::Zoom => WidgetMode::Zoom,
            };
            s.force_after_ms = Some(after_ms);
            s.force_before_ms = Some(before_ms);
            s.force_update_at = Some(
                Instant::now()
                    + Duration::from_millis(self.ctx.config.sync.pan_and_zoom_delay_ms),
            );
        }
        debug!(widget = %self.key, ?kind, after_ms, before_ms, "pan/zoom accepted");
        self.ctx.pan_and_zoom.set_master(self, after_ms, before_ms).await;
        true
    }

    /// Drop any forced window and return to `auto`. Called on pan/zoom
    /// mastership handoff and on global reset; arms an immediate refresh
    /// so the widget catches up.
    pub async fn reset_pan_zoom(&self) {
        let mut s = self.state.write().await;
        s.mode = WidgetMode::Auto;
        s.force_after_ms = None;
        s.force_before_ms = None;
        s.force_update_at = Some(Instant::now());
        s.metrics.resets += 1;
    }

    /// User-facing reset. Clears the global coordinator when this widget
    /// is its master, otherwise just resets locally.
    pub async fn reset(self: &Arc<Self>) {
        if self.ctx.pan_and_zoom.is_master(self.id).await {
            self.ctx.pan_and_zoom.clear_master().await;
        } else {
            self.reset_pan_zoom().await;
        }
    }

    // ------------------------------------------------------------------
    // selection
    // ------------------------------------------------------------------

    /// User hover at `timestamp_ms`: select locally and broadcast through
    /// the selection coordinator.
    pub async fn hover(self: &Arc<Self>, timestamp_ms: i64) {
        self.set_selection(timestamp_ms).await;
        self.ctx.selection.sync(self, timestamp_ms).await;
    }

    /// Apply a broadcast selection. No-op for libraries without selection
    /// support.
    pub async fn set_selection(&self, timestamp_ms: i64) {
        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => return,
        };
        if !renderer.supports_selection() {
            return;
        }
        let mut s = self.state.write().await;
        if let Some(frame) = s.frame.as_mut() {
            renderer.set_selection(frame, timestamp_ms);
            s.selected = true;
        }
    }

    pub async fn clear_selection(&self) {
        let renderer = match &self.renderer {
            Some(r) => r.clone(),
            None => return,
        };
        let mut s = self.state.write().await;
        if let Some(frame) = s.frame.as_mut() {
            renderer.clear_selection(frame);
        }
        s.selected = false;
    }

    // ------------------------------------------------------------------
    // cancellation
    // ------------------------------------------------------------------

    /// Abort the in-flight fetch, if any. The aborted fetch is discarded
    /// silently and never counts against the retry budget.
    pub fn abort_fetch(&self) {
        if let Ok(slot) = self.fetch_cancel.lock() {
            if let Some(token) = slot.as_ref() {
                token.cancel();
            }
        }
    }

    // ------------------------------------------------------------------
    // inspection
    // ------------------------------------------------------------------

    pub async fn display(&self) -> DisplayState {
        self.state.read().await.display.clone()
    }

    pub async fn mode(&self) -> WidgetMode {
        self.state.read().await.mode
    }

    /// Currently rendered window `(view_after, view_before)` in ms.
    pub async fn view_window(&self) -> (i64, i64) {
        let s = self.state.read().await;
        (s.view_after_ms, s.view_before_ms)
    }

    /// Window actually served by the last fetch, in ms.
    pub async fn data_window(&self) -> (i64, i64) {
        let s = self.state.read().await;
        (s.data_after_ms, s.data_before_ms)
    }

    pub async fn data_points(&self) -> usize {
        self.state.read().await.data_points
    }

    pub async fn data_update_every_ms(&self) -> u64 {
        self.state.read().await.data_update_every_ms
    }

    pub async fn metrics(&self) -> WidgetMetrics {
        self.state.read().await.metrics.clone()
    }

    pub async fn legend(&self) -> Option<Legend> {
        self.state.read().await.legend.clone()
    }

    pub async fn frame(&self) -> Option<RenderedFrame> {
        self.state.read().await.frame.clone()
    }
}

impl std::fmt::Debug for ChartWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartWidget")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("chart", &self.chart)
            .field("library", &self.config.library)
            .finish_non_exhaustive()
    }
}
