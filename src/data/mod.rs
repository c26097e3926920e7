//! Metrics Data Source Layer
//!
//! This module defines the typed interface to a metrics data server: chart
//! metadata, time-series queries and payloads, and the `DataSource` trait
//! that widgets fetch through. The HTTP implementation lives in `http`;
//! snapshot-backed replay lives in `crate::snapshot`.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

pub use http::{HttpDataSource, HttpSourceConfig};

/// Chart metadata as reported by the metrics server, normalized to
/// millisecond timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub id: String,
    pub title: String,
    pub units: String,
    /// Native reporting interval of the chart, in milliseconds.
    pub update_every_ms: u64,
    /// Oldest timestamp the server retains for this chart.
    pub first_entry_ms: i64,
    /// Newest timestamp the server has for this chart.
    pub last_entry_ms: i64,
    /// Dimension names in server order.
    pub dimensions: Vec<String>,
}

impl ChartMetadata {
    /// Retention window known to the server, as `(first, last)` in ms.
    pub fn retention(&self) -> (i64, i64) {
        (self.first_entry_ms, self.last_entry_ms)
    }
}

/// Aggregation method applied by the server when more points exist than
/// were requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMethod {
    Average,
    Sum,
    Min,
    Max,
}

impl GroupingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingMethod::Average => "average",
            GroupingMethod::Sum => "sum",
            GroupingMethod::Min => "min",
            GroupingMethod::Max => "max",
        }
    }
}

impl Default for GroupingMethod {
    fn default() -> Self {
        GroupingMethod::Average
    }
}

/// Wire format requested from the server. Both formats decode into the same
/// `DataPayload`; the flag exists because rendering libraries declare a
/// preferred encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Json,
    Array,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Json => "json",
            DataFormat::Array => "array",
        }
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        DataFormat::Json
    }
}

/// A single time-series request: the window, resolution and shaping options
/// a widget encodes into its fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    /// Window start in ms. Values `<= 0` are relative to `before_ms`.
    pub after_ms: i64,
    /// Window end in ms. Values `<= 0` are relative to now.
    pub before_ms: i64,
    /// Number of points the caller wants back.
    pub points: usize,
    pub group: GroupingMethod,
    /// Dimension filter; `None` requests all dimensions.
    pub dimensions: Option<Vec<String>>,
    pub format: DataFormat,
    /// Library-specific option flags, passed through verbatim.
    pub options: Vec<String>,
}

impl DataQuery {
    /// Encode this query as URL query pairs, in a stable order.
    pub fn to_query_pairs(&self, chart: &str) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("chart".to_string(), chart.to_string()),
            ("after".to_string(), (self.after_ms / 1000).to_string()),
            ("before".to_string(), (self.before_ms / 1000).to_string()),
            ("points".to_string(), self.points.to_string()),
            ("group".to_string(), self.group.as_str().to_string()),
            ("format".to_string(), self.format.as_str().to_string()),
        ];
        if let Some(dims) = &self.dimensions {
            pairs.push(("dimensions".to_string(), dims.join("|")));
        }
        if !self.options.is_empty() {
            pairs.push(("options".to_string(), self.options.join("|")));
        }
        pairs
    }
}

/// One row of a time-series payload. Missing values stay `None` rather than
/// being zero-filled, so renderers can show gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    pub timestamp_ms: i64,
    pub values: Vec<Option<f64>>,
}

/// The server's answer to a `DataQuery`: the window it actually served,
/// the resolution it grouped to, and the series rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPayload {
    /// Start of the window actually returned, in ms.
    pub after_ms: i64,
    /// End of the window actually returned, in ms.
    pub before_ms: i64,
    /// Effective interval between returned points, in ms.
    pub update_every_ms: u64,
    /// Dimension labels, matching `values` order in each row.
    pub labels: Vec<String>,
    pub rows: Vec<DataRow>,
}

impl DataPayload {
    pub fn points(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest non-null value per dimension, for legend display.
    pub fn latest_values(&self) -> Vec<Option<f64>> {
        let dims = self.labels.len();
        let mut latest = vec![None; dims];
        for row in self.rows.iter().rev() {
            let mut done = true;
            for (i, slot) in latest.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = row.values.get(i).copied().flatten();
                    if slot.is_none() {
                        done = false;
                    }
                }
            }
            if done {
                break;
            }
        }
        latest
    }

    /// Global min/max across all dimensions, ignoring gaps.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for row in &self.rows {
            for v in row.values.iter().copied().flatten() {
                range = Some(match range {
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    None => (v, v),
                });
            }
        }
        range
    }
}

/// Errors from the data source layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Chart not found: {0}")]
    ChartNotFound(String),

    #[error("Failed to parse server response: {0}")]
    Parse(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request was cancelled by a superseding request or a global
    /// reset. Never counted against a widget's retry budget.
    #[error("Request aborted")]
    Aborted,
}

impl DataError {
    /// Whether a widget may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::Network(_)
                | DataError::Http { status: 500..=599, .. }
                | DataError::Timeout { .. }
        )
    }
}

/// The fetch seam widgets talk through. Implemented by `HttpDataSource`
/// for live servers and by `SnapshotSource` for offline replay; tests
/// inject their own.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Fetch chart metadata for `(host, chart)`.
    async fn metadata(&self, host: &str, chart: &str) -> Result<ChartMetadata, DataError>;

    /// Fetch time-series data. Implementations must observe `cancel` and
    /// return `DataError::Aborted` when it fires mid-flight.
    async fn query(
        &self,
        host: &str,
        chart: &str,
        query: &DataQuery,
        cancel: CancellationToken,
    ) -> Result<DataPayload, DataError>;
}

/// Resolve a possibly-relative `(after, before)` window against `now_ms`.
///
/// `before <= 0` means "relative to now"; `after <= 0` means "relative to
/// the resolved before", matching the metrics server's convention.
pub fn resolve_window(after_ms: i64, before_ms: i64, now_ms: i64) -> (i64, i64) {
    let before = if before_ms <= 0 { now_ms + before_ms } else { before_ms };
    let after = if after_ms <= 0 { before + after_ms } else { after_ms };
    (after, before)
}
