//! Pan-and-Zoom Coordinator
//!
//! Elects one widget as master of a shared time viewport and lets every
//! other widget detect, via a generation counter, that it has not yet
//! caught up to the master's window. The master is held weakly; the
//! coordinator never keeps a widget alive.

use crate::widget::ChartWidget;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Callback informing the surrounding application of viewport changes,
/// with `(active, after_ms, before_ms)`.
pub type ViewportCallback = Box<dyn Fn(bool, i64, i64) + Send + Sync>;

struct Inner {
    master: Weak<ChartWidget>,
    master_id: Option<Uuid>,
    /// Monotonic generation counter; widgets compare their last-synced
    /// value against it to detect staleness.
    seq: i64,
    force_after_ms: i64,
    force_before_ms: i64,
    callback: Option<ViewportCallback>,
}

/// Shared time-viewport coordinator.
pub struct PanAndZoom {
    inner: RwLock<Inner>,
}

impl PanAndZoom {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                master: Weak::new(),
                master_id: None,
                seq: 0,
                force_after_ms: 0,
                force_before_ms: 0,
                callback: None,
            }),
        }
    }

    /// Register the application callback reflecting viewport state into
    /// page chrome (URL, history, toolbars).
    pub async fn set_callback(&self, callback: ViewportCallback) {
        self.inner.write().await.callback = Some(callback);
    }

    /// Promote `widget` to master of the window `(after_ms, before_ms)`.
    ///
    /// A different previous master is reset exactly once before the new
    /// mastership is recorded.
    pub async fn set_master(&self, widget: &Arc<ChartWidget>, after_ms: i64, before_ms: i64) {
        debug_assert!(after_ms <= before_ms);
        let previous = {
            let mut inner = self.inner.write().await;
            let previous = match inner.master_id {
                Some(id) if id != widget.id() => inner.master.upgrade(),
                _ => None,
            };
            inner.master = Arc::downgrade(widget);
            inner.master_id = Some(widget.id());
            // Wall clock can retreat; the counter must not.
            inner.seq = super::now_ms().max(inner.seq + 1);
            inner.force_after_ms = after_ms;
            inner.force_before_ms = before_ms;
            if let Some(cb) = &inner.callback {
                cb(true, after_ms, before_ms);
            }
            previous
        };
        if let Some(old) = previous {
            debug!(old = %old.key(), new = %widget.key(), "pan/zoom mastership handoff");
            old.reset_pan_zoom().await;
        }
    }

    /// Release mastership, resetting the former master.
    pub async fn clear_master(&self) {
        let previous = {
            let mut inner = self.inner.write().await;
            let previous = inner.master.upgrade();
            inner.master = Weak::new();
            inner.master_id = None;
            inner.seq = 0;
            inner.force_after_ms = 0;
            inner.force_before_ms = 0;
            if let Some(cb) = &inner.callback {
                cb(false, 0, 0);
            }
            previous
        };
        if let Some(old) = previous {
            debug!(widget = %old.key(), "pan/zoom cleared");
            old.reset_pan_zoom().await;
        }
    }

    /// True only when a master, both bounds and a non-zero generation are
    /// all set.
    pub async fn is_active(&self) -> bool {
        let inner = self.inner.read().await;
        inner.master_id.is_some()
            && inner.seq != 0
            && inner.force_after_ms != 0
            && inner.force_before_ms != 0
    }

    /// Whether the widget identified by `widget_id`, which last synced at
    /// generation `synced_seq`, must refresh to catch up with the master's
    /// window.
    pub async fn should_be_auto_refreshed(&self, widget_id: Uuid, synced_seq: i64) -> bool {
        let inner = self.inner.read().await;
        match inner.master_id {
            Some(master_id) => master_id != widget_id && inner.seq != synced_seq,
            None => false,
        }
    }

    pub async fn is_master(&self, widget_id: Uuid) -> bool {
        self.inner.read().await.master_id == Some(widget_id)
    }

    /// The forced window, when active.
    pub async fn window(&self) -> Option<(i64, i64)> {
        let inner = self.inner.read().await;
        if inner.master_id.is_some() && inner.force_after_ms != 0 && inner.force_before_ms != 0 {
            Some((inner.force_after_ms, inner.force_before_ms))
        } else {
            None
        }
    }

    /// Current generation counter.
    pub async fn seq(&self) -> i64 {
        self.inner.read().await.seq
    }
}

impl Default for PanAndZoom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PanAndZoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanAndZoom").finish_non_exhaustive()
    }
}
