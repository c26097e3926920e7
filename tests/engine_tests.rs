//! End-to-end engine behavior against a mock data source: fetch gating,
//! viewport invariants, gesture thresholds, coordinator mastership, and
//! selection fan-out.

use async_trait::async_trait;
use chartsync::config::{DashboardConfig, WidgetConfig};
use pretty_assertions::assert_eq;
use chartsync::dashboard::Dashboard;
use chartsync::data::{ChartMetadata, DataError, DataPayload, DataQuery, DataRow, DataSource};
use chartsync::snapshot::{Snapshot, SnapshotEntry, SnapshotKey};
use chartsync::widget::{DisplayState, GestureKind, UpdateOutcome, WidgetMode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

const UPDATE_EVERY_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq)]
struct RecordedQuery {
    chart: String,
    after_ms: i64,
    before_ms: i64,
    points: usize,
}

/// Mock server: answers every chart, records queries, and can hold a
/// fetch open or fail selected charts.
#[derive(Debug)]
struct MockSource {
    queries: Mutex<Vec<RecordedQuery>>,
    hold: AtomicBool,
    release: Notify,
    fail_chart: Mutex<Option<String>>,
    invert_bounds: AtomicBool,
    query_count: AtomicUsize,
}

impl MockSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            fail_chart: Mutex::new(None),
            invert_bounds: AtomicBool::new(false),
            query_count: AtomicUsize::new(0),
        })
    }

    fn fail_chart(&self, chart: &str) {
        *self.fail_chart.lock().unwrap() = Some(chart.to_string());
    }

    fn recorded(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn last_query(&self) -> RecordedQuery {
        self.recorded().last().cloned().expect("no query recorded")
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn metadata(&self, _host: &str, chart: &str) -> Result<ChartMetadata, DataError> {
        Ok(ChartMetadata {
            id: chart.to_string(),
            title: format!("Title of {}", chart),
            units: "units".to_string(),
            update_every_ms: UPDATE_EVERY_MS,
            first_entry_ms: 0,
            last_entry_ms: i64::MAX / 2,
            dimensions: vec!["a".to_string(), "b".to_string()],
        })
    }

    async fn query(
        &self,
        _host: &str,
        chart: &str,
        query: &DataQuery,
        cancel: CancellationToken,
    ) -> Result<DataPayload, DataError> {
        self.queries.lock().unwrap().push(RecordedQuery {
            chart: chart.to_string(),
            after_ms: query.after_ms,
            before_ms: query.before_ms,
            points: query.points,
        });
        self.query_count.fetch_add(1, Ordering::SeqCst);

        if self.hold.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.release.notified() => {}
                _ = cancel.cancelled() => return Err(DataError::Aborted),
            }
        }
        if self.fail_chart.lock().unwrap().as_deref() == Some(chart) {
            return Err(DataError::Network("connection refused".to_string()));
        }

        // One row per requested point, evenly spaced across the window.
        let step = ((query.before_ms - query.after_ms) / query.points.max(1) as i64).max(1);
        let rows = (0..query.points)
            .map(|i| DataRow {
                timestamp_ms: query.after_ms + step * i as i64,
                values: vec![Some(i as f64), Some(i as f64 * 2.0)],
            })
            .collect();
        // A buggy server may report the window bounds swapped.
        let (after_ms, before_ms) = if self.invert_bounds.load(Ordering::SeqCst) {
            (query.before_ms, query.after_ms)
        } else {
            (query.after_ms, query.before_ms)
        };
        Ok(DataPayload {
            after_ms,
            before_ms,
            update_every_ms: UPDATE_EVERY_MS,
            labels: vec!["a".to_string(), "b".to_string()],
            rows,
        })
    }
}

fn widget_config(chart: &str) -> WidgetConfig {
    WidgetConfig {
        chart: chart.to_string(),
        library: "table".to_string(),
        ..WidgetConfig::default()
    }
}

fn dashboard_with(source: Arc<MockSource>) -> Dashboard {
    Dashboard::with_source(DashboardConfig::default(), source, true)
}

#[tokio::test]
async fn test_update_fetches_requested_points() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard
        .create_widget(WidgetConfig {
            points: Some(300),
            ..widget_config("system.cpu")
        })
        .await;

    assert_eq!(widget.display().await, DisplayState::Loading);
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));
    assert_eq!(widget.display().await, DisplayState::Rendered);
    assert_eq!(widget.data_points().await, 300);
    assert_eq!(widget.data_update_every_ms().await, UPDATE_EVERY_MS);
    assert_eq!(source.last_query().points, 300);

    let legend = widget.legend().await.expect("legend");
    assert_eq!(legend.labels(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_second_update_is_noop_while_fetch_in_flight() {
    let source = MockSource::new();
    source.hold.store(true, Ordering::SeqCst);
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;

    let first = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.update_chart().await })
    };
    // Let the first update reach the held fetch.
    while !widget.is_fetching() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(matches!(widget.update_chart().await, UpdateOutcome::AlreadyRunning));
    assert_eq!(source.query_count.load(Ordering::SeqCst), 1);

    source.release.notify_one();
    assert!(matches!(first.await.unwrap(), UpdateOutcome::Updated));
}

#[tokio::test]
async fn test_abort_discards_fetch_without_consuming_retries() {
    let source = MockSource::new();
    source.hold.store(true, Ordering::SeqCst);
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;

    let update = {
        let widget = widget.clone();
        tokio::spawn(async move { widget.update_chart().await })
    };
    while !widget.is_fetching() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    widget.abort_fetch();
    assert!(matches!(update.await.unwrap(), UpdateOutcome::Aborted));

    let metrics = widget.metrics().await;
    assert_eq!(metrics.aborts, 1);
    assert_eq!(metrics.failures, 0);
    assert_eq!(widget.display().await, DisplayState::Loading);

    // The widget recovers on the next update.
    source.hold.store(false, Ordering::SeqCst);
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));
}

#[tokio::test]
async fn test_inverted_server_bounds_are_normalized() {
    let source = MockSource::new();
    source.invert_bounds.store(true, Ordering::SeqCst);
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;

    // The swapped bounds must be contained, not take the widget down.
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));
    assert_eq!(widget.display().await, DisplayState::Rendered);

    let (data_after, data_before) = widget.data_window().await;
    let (view_after, view_before) = widget.view_window().await;
    assert!(data_after <= data_before);
    assert!(data_after <= view_after);
    assert!(view_after <= view_before);
    assert!(view_before <= data_before);
}

#[tokio::test]
async fn test_snapshot_data_stays_fresh() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard
        .create_widget(WidgetConfig {
            update_every_ms: Some(1),
            ..widget_config("system.cpu")
        })
        .await;

    let key = SnapshotKey {
        chart: "system.cpu".to_string(),
        library: "table".to_string(),
        dimensions: None,
        options: vec![],
    };
    let mut entries = HashMap::new();
    entries.insert(
        key.cache_key(),
        SnapshotEntry {
            chart: "system.cpu".to_string(),
            payload: DataPayload {
                after_ms: 1_000_000,
                before_ms: 2_000_000,
                update_every_ms: UPDATE_EVERY_MS,
                labels: vec!["a".to_string(), "b".to_string()],
                rows: vec![
                    DataRow { timestamp_ms: 1_000_000, values: vec![Some(1.0), Some(2.0)] },
                    DataRow { timestamp_ms: 2_000_000, values: vec![Some(3.0), Some(4.0)] },
                ],
            },
        },
    );
    dashboard
        .context()
        .snapshot
        .install(Snapshot {
            hostname: "box".to_string(),
            after_ms: 1_000_000,
            before_ms: 2_000_000,
            entries,
        })
        .await;

    // Rendered from the snapshot, no server fetch.
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));
    assert_eq!(source.query_count.load(Ordering::SeqCst), 0);

    // Well past the widget's own interval; snapshot data never goes stale.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!widget.can_be_auto_refreshed().await);

    dashboard.context().snapshot.unload().await;
    assert!(widget.can_be_auto_refreshed().await);
}

#[tokio::test]
async fn test_failures_contained_per_widget() {
    let source = MockSource::new();
    source.fail_chart("disk.io");
    let dashboard = dashboard_with(source.clone());
    let good = dashboard.create_widget(widget_config("system.cpu")).await;
    let bad = dashboard.create_widget(widget_config("disk.io")).await;

    // Retry budget (3) plus the final permanent failure.
    for _ in 0..4 {
        assert!(matches!(bad.update_chart().await, UpdateOutcome::Failed(_)));
    }
    assert!(matches!(bad.display().await, DisplayState::Failed(_)));
    assert!(!bad.can_be_auto_refreshed().await);

    assert!(matches!(good.update_chart().await, UpdateOutcome::Updated));
    assert_eq!(good.display().await, DisplayState::Rendered);
}

#[tokio::test]
async fn test_small_gestures_rejected() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));

    let (view_after, view_before) = widget.view_window().await;
    let threshold = 2 * UPDATE_EVERY_MS as i64;

    // Shift and duration change both below twice the reporting interval.
    let nudge = threshold / 2;
    assert!(
        !widget
            .update_pan_or_zoom(GestureKind::Pan, view_after + nudge, view_before + nudge)
            .await
    );
    // A zoom tighter than the minimum window.
    assert!(
        !widget
            .update_pan_or_zoom(GestureKind::Zoom, view_before - threshold / 2, view_before)
            .await
    );
    assert_eq!(widget.mode().await, WidgetMode::Auto);
    assert!(!dashboard.context().pan_and_zoom.is_active().await);
}

#[tokio::test]
async fn test_pan_clamps_view_to_served_data() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));

    let (view_after, view_before) = widget.view_window().await;
    let (pan_after, pan_before) = (view_after - 60_000, view_before - 60_000);
    assert!(widget.update_pan_or_zoom(GestureKind::Pan, pan_after, pan_before).await);
    assert_eq!(widget.mode().await, WidgetMode::Pan);
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));

    // Panning fetches wider than the view; the rendered window stays the
    // requested one, inside the served bounds.
    let query = source.last_query();
    assert!(query.after_ms < pan_after);
    assert!(query.before_ms > pan_before);
    assert_eq!(widget.view_window().await, (pan_after, pan_before));
    let (data_after, data_before) = widget.data_window().await;
    assert!(data_after <= pan_after);
    assert!(pan_before <= data_before);
}

#[tokio::test]
async fn test_mastership_handoff_resets_previous_master_once() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let a = dashboard.create_widget(widget_config("system.cpu")).await;
    let b = dashboard.create_widget(widget_config("system.ram")).await;
    assert!(matches!(a.update_chart().await, UpdateOutcome::Updated));
    assert!(matches!(b.update_chart().await, UpdateOutcome::Updated));

    let (a_after, a_before) = a.view_window().await;
    assert!(a.update_pan_or_zoom(GestureKind::Zoom, a_after - 120_000, a_before - 120_000).await);
    assert!(dashboard.context().pan_and_zoom.is_master(a.id()).await);

    let (b_after, b_before) = (a_after - 300_000, a_before - 300_000);
    assert!(b.update_pan_or_zoom(GestureKind::Zoom, b_after, b_before).await);

    assert!(dashboard.context().pan_and_zoom.is_master(b.id()).await);
    assert_eq!(dashboard.context().pan_and_zoom.window().await, Some((b_after, b_before)));
    assert_eq!(a.metrics().await.resets, 1);
    assert_eq!(a.mode().await, WidgetMode::Auto);
    assert_eq!(b.mode().await, WidgetMode::Zoom);
}

#[tokio::test]
async fn test_slave_catches_up_with_master_window() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let a = dashboard.create_widget(widget_config("system.cpu")).await;
    let b = dashboard.create_widget(widget_config("system.ram")).await;
    assert!(matches!(a.update_chart().await, UpdateOutcome::Updated));
    assert!(matches!(b.update_chart().await, UpdateOutcome::Updated));
    assert!(!b.can_be_auto_refreshed().await);

    let (view_after, view_before) = a.view_window().await;
    let (pan_after, pan_before) = (view_after - 120_000, view_before - 120_000);
    assert!(a.update_pan_or_zoom(GestureKind::Zoom, pan_after, pan_before).await);

    // B is stale against the new generation and adopts the exact window.
    assert!(b.can_be_auto_refreshed().await);
    assert!(matches!(b.update_chart().await, UpdateOutcome::Updated));
    let query = source.last_query();
    assert_eq!(query.chart, "system.ram");
    assert_eq!((query.after_ms, query.before_ms), (pan_after, pan_before));

    // Caught up: no further refresh due while the viewport holds still.
    assert!(!b.can_be_auto_refreshed().await);
}

#[tokio::test]
async fn test_global_reset_returns_widgets_to_auto() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let widget = dashboard.create_widget(widget_config("system.cpu")).await;
    assert!(matches!(widget.update_chart().await, UpdateOutcome::Updated));

    let (view_after, view_before) = widget.view_window().await;
    assert!(
        widget
            .update_pan_or_zoom(GestureKind::Pan, view_after - 60_000, view_before - 60_000)
            .await
    );
    dashboard.reset_all().await;

    assert_eq!(widget.mode().await, WidgetMode::Auto);
    assert!(!dashboard.context().pan_and_zoom.is_active().await);
    assert_eq!(widget.metrics().await.resets, 1);
}

#[tokio::test]
async fn test_selection_deduped_and_fanned_out() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let a = dashboard.create_widget(widget_config("system.cpu")).await;
    let b = dashboard.create_widget(widget_config("system.ram")).await;
    assert!(matches!(a.update_chart().await, UpdateOutcome::Updated));
    assert!(matches!(b.update_chart().await, UpdateOutcome::Updated));

    let writes = Arc::new(AtomicUsize::new(0));
    {
        let writes = writes.clone();
        dashboard
            .context()
            .selection
            .set_display(Box::new(move |_t| {
                writes.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
    }

    let t = 1_000_000;
    a.hover(t).await;
    a.hover(t).await;
    assert_eq!(writes.load(Ordering::SeqCst), 1);
    a.hover(t + 5_000).await;
    assert_eq!(writes.load(Ordering::SeqCst), 2);

    // Fan-out is debounced off the caller's path.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let frame = b.frame().await.expect("frame");
    assert_eq!(frame.selection_ms, Some(t + 5_000));

    dashboard.context().selection.stop().await;
    let frame = b.frame().await.expect("frame");
    assert_eq!(frame.selection_ms, None);
}

#[tokio::test]
async fn test_selected_widget_not_auto_refreshed() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let a = dashboard.create_widget(widget_config("system.cpu")).await;
    let b = dashboard.create_widget(widget_config("system.ram")).await;
    assert!(matches!(a.update_chart().await, UpdateOutcome::Updated));
    assert!(matches!(b.update_chart().await, UpdateOutcome::Updated));

    a.hover(2_000_000).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Both the hovered widget and its synced slave hold still.
    assert!(!a.can_be_auto_refreshed().await);
    assert!(!b.can_be_auto_refreshed().await);

    dashboard.context().selection.stop().await;
    a.clear_selection().await;
    b.clear_selection().await;
}

#[tokio::test]
async fn test_focus_loss_stops_refresh_of_updated_widgets() {
    let source = MockSource::new();
    let dashboard = dashboard_with(source.clone());
    let seen = dashboard.create_widget(widget_config("system.cpu")).await;
    let fresh = dashboard.create_widget(widget_config("system.ram")).await;
    assert!(matches!(seen.update_chart().await, UpdateOutcome::Updated));

    dashboard.set_focus(false);
    // A widget that has rendered at least once waits for focus; one that
    // has never rendered still gets its first update.
    assert!(!seen.can_be_auto_refreshed().await);
    assert!(fresh.can_be_auto_refreshed().await);

    dashboard.set_focus(true);
    assert!(fresh.can_be_auto_refreshed().await);
}
