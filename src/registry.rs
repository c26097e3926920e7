//! Chart Registry
//!
//! Dashboard-wide cache of chart metadata keyed by `(host, chart-id)`.
//! Metadata is fetched at most once per key; concurrent requests for the
//! same chart share a single in-flight fetch instead of each hitting the
//! server. A failed fetch leaves the slot empty so a later caller retries.

use crate::data::{ChartMetadata, DataError, DataSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

type Key = (String, String);
type Slot = Arc<OnceCell<Arc<ChartMetadata>>>;

/// Metadata cache shared by every widget of one dashboard.
#[derive(Debug)]
pub struct ChartRegistry {
    source: Arc<dyn DataSource>,
    charts: RwLock<HashMap<Key, Slot>>,
}

impl ChartRegistry {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            charts: RwLock::new(HashMap::new()),
        }
    }

    /// Get metadata for `(host, chart)`, fetching it on first use.
    pub async fn metadata(&self, host: &str, chart: &str) -> Result<Arc<ChartMetadata>, DataError> {
        let slot = {
            let key = (host.to_string(), chart.to_string());
            let mut charts = self.charts.write().await;
            charts.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        slot.get_or_try_init(|| async {
            debug!(host, chart, "fetching chart metadata");
            let metadata = self.source.metadata(host, chart).await?;
            Ok(Arc::new(metadata))
        })
        .await
        .cloned()
    }

    /// Cached metadata, if it has been fetched already.
    pub async fn cached(&self, host: &str, chart: &str) -> Option<Arc<ChartMetadata>> {
        let charts = self.charts.read().await;
        charts
            .get(&(host.to_string(), chart.to_string()))
            .and_then(|slot| slot.get().cloned())
    }

    /// Drop every cached entry. Used by a global reset.
    pub async fn clear(&self) {
        self.charts.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.charts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.charts.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataPayload, DataQuery};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct CountingSource {
        fetches: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl CountingSource {
        fn new(fail_first: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(fail_first),
            }
        }
    }

    #[async_trait]
    impl DataSource for CountingSource {
        async fn metadata(&self, _host: &str, chart: &str) -> Result<ChartMetadata, DataError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(DataError::Network("transient".into()));
            }
            Ok(ChartMetadata {
                id: chart.to_string(),
                title: chart.to_string(),
                units: "x".into(),
                update_every_ms: 1000,
                first_entry_ms: 0,
                last_entry_ms: 10_000,
                dimensions: vec!["value".into()],
            })
        }

        async fn query(
            &self,
            _host: &str,
            _chart: &str,
            _query: &DataQuery,
            _cancel: CancellationToken,
        ) -> Result<DataPayload, DataError> {
            unreachable!("registry never queries data");
        }
    }

    #[tokio::test]
    async fn test_metadata_fetched_once() {
        let source = Arc::new(CountingSource::new(0));
        let registry = ChartRegistry::new(source.clone());

        let a = registry.metadata("", "system.cpu").await.unwrap();
        let b = registry.metadata("", "system.cpu").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let source = Arc::new(CountingSource::new(0));
        let registry = Arc::new(ChartRegistry::new(source.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.metadata("", "system.cpu").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_retried_later() {
        let source = Arc::new(CountingSource::new(1));
        let registry = ChartRegistry::new(source.clone());

        assert!(registry.metadata("", "system.cpu").await.is_err());
        assert!(registry.cached("", "system.cpu").await.is_none());
        assert!(registry.metadata("", "system.cpu").await.is_ok());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_hosts_distinct_entries() {
        let source = Arc::new(CountingSource::new(0));
        let registry = ChartRegistry::new(source.clone());

        registry.metadata("a", "system.cpu").await.unwrap();
        registry.metadata("b", "system.cpu").await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len().await, 2);
    }
}
