//! Selection-Sync Coordinator
//!
//! Broadcasts one widget's point-in-time hover selection to every other
//! visible, selection-capable widget. The slave list is recomputed each
//! time mastership changes; identical timestamps are de-duped so the
//! external "current time" display is written at most once per distinct
//! selection; fan-out is debounced off the caller's path.

use crate::config::SyncConfig;
use crate::visibility::VisibilityTracker;
use crate::widget::ChartWidget;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

/// Callback updating the external "current time" display.
pub type DisplayCallback = Box<dyn Fn(i64) + Send + Sync>;

struct Inner {
    master: Weak<ChartWidget>,
    master_id: Option<Uuid>,
    slaves: Vec<Weak<ChartWidget>>,
    last_t: i64,
    /// No new master is accepted before this wall-clock instant.
    dont_sync_before_ms: i64,
    fanout_pending: bool,
    display: Option<DisplayCallback>,
}

/// Shared hover-selection coordinator.
pub struct SelectionSync {
    enabled: bool,
    debounce: Duration,
    cooldown_ms: i64,
    visibility: Arc<VisibilityTracker>,
    inner: RwLock<Inner>,
}

impl SelectionSync {
    pub fn new(config: &SyncConfig, visibility: Arc<VisibilityTracker>) -> Self {
        Self {
            enabled: config.selection_enabled,
            debounce: Duration::from_millis(config.selection_debounce_ms),
            cooldown_ms: config.selection_cooldown_ms as i64,
            visibility,
            inner: RwLock::new(Inner {
                master: Weak::new(),
                master_id: None,
                slaves: Vec::new(),
                last_t: 0,
                dont_sync_before_ms: 0,
                fanout_pending: false,
                display: None,
            }),
        }
    }

    /// Register the external "current time" display callback.
    pub async fn set_display(&self, display: DisplayCallback) {
        self.inner.write().await.display = Some(display);
    }

    /// Push the cool-down out; no new master is accepted until it passes.
    pub async fn delay(&self) {
        let mut inner = self.inner.write().await;
        inner.dont_sync_before_ms = super::now_ms() + self.cooldown_ms;
    }

    /// Try to promote `widget` to selection master, recomputing the slave
    /// list from the currently visible, selection-capable widgets. Returns
    /// false when sync is disabled or cooling down.
    pub async fn set_master(&self, widget: &Arc<ChartWidget>) -> bool {
        if !self.enabled {
            return false;
        }
        // Collect candidates before taking the lock; the tracker has its own.
        let candidates = self.visibility.visible_widgets().await;
        let mut inner = self.inner.write().await;
        if super::now_ms() < inner.dont_sync_before_ms {
            return false;
        }
        if inner.master_id == Some(widget.id()) {
            return true;
        }
        inner.slaves = candidates
            .iter()
            .filter(|w| w.id() != widget.id() && w.supports_selection())
            .map(Arc::downgrade)
            .collect();
        inner.master = Arc::downgrade(widget);
        inner.master_id = Some(widget.id());
        trace!(master = %widget.key(), slaves = inner.slaves.len(), "selection master set");
        true
    }

    /// Broadcast the selection of `timestamp_ms` from `widget`, promoting
    /// it to master first if needed. Redundant timestamps are dropped
    /// before any external write.
    pub async fn sync(self: &Arc<Self>, widget: &Arc<ChartWidget>, timestamp_ms: i64) {
        {
            let inner = self.inner.read().await;
            if inner.master_id != Some(widget.id()) {
                drop(inner);
                if !self.set_master(widget).await {
                    return;
                }
            }
        }

        let schedule = {
            let mut inner = self.inner.write().await;
            if inner.last_t == timestamp_ms {
                return;
            }
            inner.last_t = timestamp_ms;
            if let Some(display) = &inner.display {
                display(timestamp_ms);
            }
            if inner.fanout_pending {
                false
            } else {
                inner.fanout_pending = true;
                true
            }
        };

        if schedule {
            let sync = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(sync.debounce).await;
                sync.fan_out().await;
            });
        }
    }

    async fn fan_out(&self) {
        let (slaves, timestamp_ms) = {
            let mut inner = self.inner.write().await;
            inner.fanout_pending = false;
            (inner.slaves.clone(), inner.last_t)
        };
        for slave in slaves {
            if let Some(widget) = slave.upgrade() {
                widget.set_selection(timestamp_ms).await;
            }
        }
    }

    /// Clear selection visuals everywhere and drop master and slaves.
    pub async fn stop(&self) {
        let (master, slaves) = {
            let mut inner = self.inner.write().await;
            let master = inner.master.upgrade();
            let slaves = std::mem::take(&mut inner.slaves);
            inner.master = Weak::new();
            inner.master_id = None;
            inner.last_t = 0;
            (master, slaves)
        };
        if let Some(widget) = master {
            widget.clear_selection().await;
        }
        for slave in slaves {
            if let Some(widget) = slave.upgrade() {
                widget.clear_selection().await;
            }
        }
    }

    pub async fn master_id(&self) -> Option<Uuid> {
        self.inner.read().await.master_id
    }

    pub async fn slave_count(&self) -> usize {
        self.inner.read().await.slaves.len()
    }

    pub async fn last_timestamp(&self) -> i64 {
        self.inner.read().await.last_t
    }
}

impl std::fmt::Debug for SelectionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionSync")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
