//! Rendering Library Seam
//!
//! The original system selected a charting library per widget by name and
//! probed it for capabilities at runtime. Here that duck-typed surface is a
//! trait: widgets resolve a `Renderer` once at construction and dispatch
//! create/update/resize through it. Two headless renderers ship built in so
//! the engine runs and tests without any GUI backend.

pub mod table;

use crate::data::DataPayload;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use table::{SparklineRenderer, TableRenderer};

/// Per-render snapshot of the widget fields a renderer may read.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub chart_id: String,
    pub title: String,
    pub units: String,
    pub view_after_ms: i64,
    pub view_before_ms: i64,
    pub width_px: u32,
    pub height_px: u32,
}

/// In-memory render output. GUI backends would translate this into their
/// own scene; the built-in renderers fill `lines` with text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedFrame {
    pub library: String,
    pub lines: Vec<String>,
    pub selection_ms: Option<i64>,
    pub width_px: u32,
    pub height_px: u32,
    /// Bumped on every create/update so callers can detect redraws.
    pub revision: u64,
}

/// One legend row: dimension label plus its latest value.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub value: Option<f64>,
}

/// Legend state derived from the last payload. Rebuilt on every render;
/// rebuilding from unchanged data must yield an identical label set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Legend {
    pub title: String,
    pub units: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn from_payload(title: &str, units: &str, payload: &DataPayload) -> Self {
        let latest = payload.latest_values();
        let entries = payload
            .labels
            .iter()
            .zip(latest)
            .map(|(label, value)| LegendEntry { label: label.clone(), value })
            .collect();
        Self {
            title: title.to_string(),
            units: units.to_string(),
            entries,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Errors raised by rendering libraries. Always contained at the widget
/// boundary; the scheduler never sees them.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Renderer initialization failed: {0}")]
    InitFailed(String),

    #[error("Render failed: {0}")]
    Failed(String),
}

/// Capability-polymorphic rendering interface. Defaults describe the least
/// capable library; implementations override what they support.
pub trait Renderer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// One-time library initialization. The registry guarantees this runs
    /// at most once, lazily, before the first create.
    fn initialize(&self) -> Result<(), RenderError> {
        Ok(())
    }

    /// First render for a widget.
    fn create(&self, ctx: &RenderContext, data: &DataPayload) -> Result<RenderedFrame, RenderError>;

    /// Subsequent renders, reusing the existing frame.
    fn update(
        &self,
        frame: &mut RenderedFrame,
        ctx: &RenderContext,
        data: &DataPayload,
    ) -> Result<(), RenderError>;

    fn resize(&self, frame: &mut RenderedFrame, width_px: u32, height_px: u32) {
        frame.width_px = width_px;
        frame.height_px = height_px;
    }

    fn supports_legend(&self) -> bool {
        true
    }

    fn autoresize(&self) -> bool {
        false
    }

    /// Horizontal pixels one data point occupies; used to derive a point
    /// count from widget width when none is configured.
    fn pixels_per_point(&self) -> u32 {
        3
    }

    fn supports_selection(&self) -> bool {
        false
    }

    fn set_selection(&self, _frame: &mut RenderedFrame, _timestamp_ms: i64) {}

    fn clear_selection(&self, _frame: &mut RenderedFrame) {}

    fn supports_pan_and_zoom(&self) -> bool {
        true
    }
}

struct Registered {
    renderer: Arc<dyn Renderer>,
    initialized: bool,
}

/// Name-keyed renderer registry with one-time lazy initialization.
pub struct RendererRegistry {
    renderers: RwLock<HashMap<String, Registered>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self {
            renderers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the built-in headless renderers.
    pub fn with_defaults() -> Self {
        let mut map = HashMap::new();
        map.insert(
            "table".to_string(),
            Registered {
                renderer: Arc::new(TableRenderer::default()) as Arc<dyn Renderer>,
                initialized: false,
            },
        );
        map.insert(
            "sparkline".to_string(),
            Registered {
                renderer: Arc::new(SparklineRenderer::default()) as Arc<dyn Renderer>,
                initialized: false,
            },
        );
        Self {
            renderers: RwLock::new(map),
        }
    }

    pub async fn register(&self, renderer: Arc<dyn Renderer>) {
        let mut map = self.renderers.write().await;
        map.insert(
            renderer.name().to_string(),
            Registered { renderer, initialized: false },
        );
    }

    /// Look up a renderer without initializing it.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        self.renderers.read().await.get(name).map(|r| r.renderer.clone())
    }

    /// Look up a renderer, running its one-time initialization first if it
    /// has not run yet.
    pub async fn get_initialized(&self, name: &str) -> Result<Arc<dyn Renderer>, RenderError> {
        {
            let map = self.renderers.read().await;
            match map.get(name) {
                Some(r) if r.initialized => return Ok(r.renderer.clone()),
                Some(_) => {}
                None => {
                    return Err(RenderError::InitFailed(format!("unknown renderer: {}", name)))
                }
            }
        }
        let mut map = self.renderers.write().await;
        let entry = map
            .get_mut(name)
            .ok_or_else(|| RenderError::InitFailed(format!("unknown renderer: {}", name)))?;
        if !entry.initialized {
            entry.renderer.initialize()?;
            entry.initialized = true;
            tracing::debug!(renderer = name, "renderer initialized");
        }
        Ok(entry.renderer.clone())
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry").finish_non_exhaustive()
    }
}
