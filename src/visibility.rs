//! Visibility Tracker
//!
//! Maintains the ordered list of widgets currently inside the viewport.
//! The embedding application feeds visibility transitions and scroll
//! direction in; the scheduler iterates widgets in this list's order so
//! refreshes run visually top-to-bottom along the scroll direction.
//!
//! When the embedder has no intersection signal at all, the tracker runs
//! in fallback mode and reports every registered widget as visible.

use crate::widget::ChartWidget;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::trace;

/// Direction of the last scroll gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug)]
struct Inner {
    /// Every registered widget, registration order.
    all: Vec<Weak<ChartWidget>>,
    /// Currently visible widgets, refresh order.
    visible: Vec<Weak<ChartWidget>>,
    direction: ScrollDirection,
    /// Bumped on every scroll; widgets stamp their cached visibility
    /// with it so stale caches are detectable.
    scroll_generation: u64,
}

/// Ordered visibility bookkeeping for one dashboard.
#[derive(Debug)]
pub struct VisibilityTracker {
    inner: RwLock<Inner>,
    /// No intersection signal available: treat everything as visible.
    fallback_all: bool,
}

impl VisibilityTracker {
    pub fn new(fallback_all: bool) -> Self {
        Self {
            inner: RwLock::new(Inner {
                all: Vec::new(),
                visible: Vec::new(),
                direction: ScrollDirection::Down,
                scroll_generation: 0,
            }),
            fallback_all,
        }
    }

    /// Register a widget. In fallback mode it is immediately visible.
    pub async fn register(&self, widget: &Arc<ChartWidget>) {
        let generation = {
            let mut inner = self.inner.write().await;
            inner.all.push(Arc::downgrade(widget));
            if self.fallback_all {
                inner.visible.push(Arc::downgrade(widget));
            }
            inner.scroll_generation
        };
        if self.fallback_all {
            widget.mark_visible(true, generation).await;
        }
    }

    /// Record a widget entering or leaving the viewport. Entering widgets
    /// are appended when scrolling down and prepended when scrolling up.
    pub async fn set_visible(&self, widget: &Arc<ChartWidget>, visible: bool) {
        if self.fallback_all {
            return;
        }
        let generation = {
            let mut inner = self.inner.write().await;
            inner.visible.retain(|w| match w.upgrade() {
                Some(existing) => existing.id() != widget.id(),
                None => false,
            });
            if visible {
                match inner.direction {
                    ScrollDirection::Down => inner.visible.push(Arc::downgrade(widget)),
                    ScrollDirection::Up => inner.visible.insert(0, Arc::downgrade(widget)),
                }
            }
            inner.scroll_generation
        };
        trace!(widget = %widget.key(), visible, "visibility change");
        widget.mark_visible(visible, generation).await;
    }

    /// Record a scroll gesture; returns the new scroll generation.
    pub async fn note_scroll(&self, direction: ScrollDirection) -> u64 {
        let mut inner = self.inner.write().await;
        inner.direction = direction;
        inner.scroll_generation += 1;
        inner.scroll_generation
    }

    pub async fn scroll_generation(&self) -> u64 {
        self.inner.read().await.scroll_generation
    }

    /// Visible widgets in refresh order, pruning dropped ones.
    pub async fn visible_widgets(&self) -> Vec<Arc<ChartWidget>> {
        let mut inner = self.inner.write().await;
        let mut out = Vec::with_capacity(inner.visible.len());
        inner.visible.retain(|w| match w.upgrade() {
            Some(widget) => {
                out.push(widget);
                true
            }
            None => false,
        });
        out
    }

    /// Every registered, still-live widget in registration order.
    pub async fn all_widgets(&self) -> Vec<Arc<ChartWidget>> {
        let mut inner = self.inner.write().await;
        let mut out = Vec::with_capacity(inner.all.len());
        inner.all.retain(|w| match w.upgrade() {
            Some(widget) => {
                out.push(widget);
                true
            }
            None => false,
        });
        out
    }
}
