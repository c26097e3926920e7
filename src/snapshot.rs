//! Snapshot Store
//!
//! A snapshot is a previously captured bundle of chart payloads, keyed by a
//! deterministic per-widget cache key. While one is loaded, widgets read
//! from it instead of fetching, and the scheduler treats the data as always
//! fresh. Compression of the on-disk form is out of scope; snapshots are
//! plain JSON here.

use crate::data::{ChartMetadata, DataError, DataPayload, DataQuery, DataSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Deterministic cache key identifying one widget's data in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub chart: String,
    pub library: String,
    pub dimensions: Option<Vec<String>>,
    pub options: Vec<String>,
}

impl SnapshotKey {
    /// Stable string form used as the map key on disk.
    pub fn cache_key(&self) -> String {
        let dims = match &self.dimensions {
            Some(d) => d.join("|"),
            None => "*".to_string(),
        };
        format!("{}/{}/{}/{}", self.chart, self.library, dims, self.options.join("|"))
    }
}

/// One captured payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub chart: String,
    pub payload: DataPayload,
}

/// A captured dashboard: the window it covers plus per-widget payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub hostname: String,
    pub after_ms: i64,
    pub before_ms: i64,
    pub entries: HashMap<String, SnapshotEntry>,
}

/// Errors from snapshot handling.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Invalid snapshot: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Holder for the currently loaded snapshot, if any.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load_from_file(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        info!(
            entries = snapshot.entries.len(),
            hostname = %snapshot.hostname,
            "snapshot loaded"
        );
        *self.current.write().await = Some(Arc::new(snapshot));
        Ok(())
    }

    pub async fn install(&self, snapshot: Snapshot) {
        *self.current.write().await = Some(Arc::new(snapshot));
    }

    pub async fn unload(&self) {
        *self.current.write().await = None;
    }

    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Payload for a widget's cache key, if a snapshot is loaded and has it.
    pub async fn payload(&self, key: &SnapshotKey) -> Option<DataPayload> {
        let current = self.current.read().await;
        current
            .as_ref()
            .and_then(|s| s.entries.get(&key.cache_key()))
            .map(|e| e.payload.clone())
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<(), SnapshotError> {
        let current = self.current.read().await;
        let snapshot = current.as_deref().cloned().unwrap_or_default();
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// A `DataSource` that answers every request from a loaded snapshot, for
/// fully offline replay. Metadata is synthesized from the captured payload.
#[derive(Debug)]
pub struct SnapshotSource {
    store: Arc<SnapshotStore>,
}

impl SnapshotSource {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    async fn entry_for_chart(&self, chart: &str) -> Option<SnapshotEntry> {
        let current = self.store.current.read().await;
        current.as_ref().and_then(|s| {
            s.entries.values().find(|e| e.chart == chart).cloned()
        })
    }
}

#[async_trait]
impl DataSource for SnapshotSource {
    async fn metadata(&self, _host: &str, chart: &str) -> Result<ChartMetadata, DataError> {
        let entry = self
            .entry_for_chart(chart)
            .await
            .ok_or_else(|| DataError::ChartNotFound(chart.to_string()))?;
        Ok(ChartMetadata {
            id: chart.to_string(),
            title: chart.to_string(),
            units: String::new(),
            update_every_ms: entry.payload.update_every_ms,
            first_entry_ms: entry.payload.after_ms,
            last_entry_ms: entry.payload.before_ms,
            dimensions: entry.payload.labels.clone(),
        })
    }

    async fn query(
        &self,
        _host: &str,
        chart: &str,
        _query: &DataQuery,
        _cancel: CancellationToken,
    ) -> Result<DataPayload, DataError> {
        self.entry_for_chart(chart)
            .await
            .map(|e| e.payload)
            .ok_or_else(|| DataError::ChartNotFound(chart.to_string()))
    }
}
