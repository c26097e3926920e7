//! HTTP Data Source
//!
//! Client for the metrics server's chart and data endpoints. Wire structs
//! mirror the server's JSON; everything is normalized to millisecond
//! timestamps before leaving this module.

use super::{ChartMetadata, DataError, DataPayload, DataQuery, DataRow, DataSource};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// HTTP source configuration.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:19999".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Live data source backed by a metrics server's HTTP API.
#[derive(Debug)]
pub struct HttpDataSource {
    client: Client,
    config: HttpSourceConfig,
}

/// Wire metadata: `/api/v1/chart?chart=<id>`. Times are in seconds.
#[derive(Debug, Deserialize)]
struct WireChart {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    units: String,
    update_every: u64,
    #[serde(default)]
    first_entry: i64,
    #[serde(default)]
    last_entry: i64,
    #[serde(default)]
    dimensions: HashMap<String, WireDimension>,
}

#[derive(Debug, Deserialize)]
struct WireDimension {
    #[serde(default)]
    name: String,
}

/// Wire data: `/api/v1/data?...`. Rows lead with the timestamp column.
#[derive(Debug, Deserialize)]
struct WireData {
    #[serde(default)]
    after: i64,
    #[serde(default)]
    before: i64,
    #[serde(default)]
    view_update_every: u64,
    labels: Vec<String>,
    data: Vec<Vec<Option<f64>>>,
}

impl HttpDataSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, host: &str, path: &str) -> Result<Url, DataError> {
        let mut url =
            Url::parse(&self.config.base_url).map_err(|e| DataError::Parse(e.to_string()))?;
        // Multi-host servers expose children under /host/<name>/.
        let full = if host.is_empty() {
            format!("api/v1/{}", path)
        } else {
            format!("host/{}/api/v1/{}", host, path)
        };
        url.path_segments_mut()
            .map_err(|_| DataError::Parse("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(full.split('/'));
        Ok(url)
    }

    async fn error_for(response: Response) -> DataError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        match status {
            404 => DataError::ChartNotFound(body),
            _ => DataError::Http { status, body },
        }
    }

    fn convert_chart(wire: WireChart) -> ChartMetadata {
        let mut dimensions: Vec<String> = wire
            .dimensions
            .iter()
            .map(|(id, d)| if d.name.is_empty() { id.clone() } else { d.name.clone() })
            .collect();
        dimensions.sort();
        ChartMetadata {
            title: if wire.title.is_empty() { wire.id.clone() } else { wire.title },
            id: wire.id,
            units: wire.units,
            update_every_ms: wire.update_every.max(1) * 1000,
            first_entry_ms: wire.first_entry * 1000,
            last_entry_ms: wire.last_entry * 1000,
            dimensions,
        }
    }

    fn convert_data(wire: WireData) -> Result<DataPayload, DataError> {
        let mut labels = wire.labels;
        // The server leads the label row with the time column.
        if labels.first().map(|l| l == "time").unwrap_or(false) {
            labels.remove(0);
        }
        let mut rows = Vec::with_capacity(wire.data.len());
        for mut row in wire.data {
            if row.is_empty() {
                return Err(DataError::Parse("empty data row".to_string()));
            }
            let timestamp = row
                .remove(0)
                .ok_or_else(|| DataError::Parse("data row missing timestamp".to_string()))?;
            rows.push(DataRow {
                timestamp_ms: (timestamp as i64) * 1000,
                values: row,
            });
        }
        // Server rows arrive newest-first; widgets want oldest-first.
        if rows.len() > 1
            && rows.first().map(|r| r.timestamp_ms) > rows.last().map(|r| r.timestamp_ms)
        {
            rows.reverse();
        }
        Ok(DataPayload {
            after_ms: wire.after * 1000,
            before_ms: wire.before * 1000,
            update_every_ms: wire.view_update_every.max(1) * 1000,
            labels,
            rows,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
        cancel: CancellationToken,
    ) -> Result<T, DataError> {
        let request = self.client.get(url).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DataError::Aborted),
            r = request => r.map_err(|e| {
                if e.is_timeout() {
                    DataError::Timeout { timeout_ms: self.config.timeout.as_millis() as u64 }
                } else {
                    DataError::Network(e.to_string())
                }
            })?,
        };
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(DataError::Aborted),
            body = response.json::<T>() => body.map_err(|e| DataError::Parse(e.to_string())),
        }
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn metadata(&self, host: &str, chart: &str) -> Result<ChartMetadata, DataError> {
        let mut url = self.endpoint(host, "chart")?;
        url.query_pairs_mut().append_pair("chart", chart);
        let wire: WireChart = self.get_json(url, CancellationToken::new()).await?;
        Ok(Self::convert_chart(wire))
    }

    async fn query(
        &self,
        host: &str,
        chart: &str,
        query: &DataQuery,
        cancel: CancellationToken,
    ) -> Result<DataPayload, DataError> {
        let mut url = self.endpoint(host, "data")?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query.to_query_pairs(chart) {
                pairs.append_pair(&k, &v);
            }
        }
        let wire: WireData = self.get_json(url, cancel).await?;
        Self::convert_data(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_for_local_host() {
        let source = HttpDataSource::new(HttpSourceConfig::default()).unwrap();
        let url = source.endpoint("", "chart").unwrap();
        assert_eq!(url.as_str(), "http://localhost:19999/api/v1/chart");
    }

    #[test]
    fn test_endpoint_for_child_host() {
        let source = HttpDataSource::new(HttpSourceConfig::default()).unwrap();
        let url = source.endpoint("child-1", "data").unwrap();
        assert_eq!(url.as_str(), "http://localhost:19999/host/child-1/api/v1/data");
    }

    #[test]
    fn test_convert_data_strips_time_column_and_reorders() {
        let wire = WireData {
            after: 100,
            before: 102,
            view_update_every: 1,
            labels: vec!["time".into(), "user".into()],
            data: vec![
                vec![Some(102.0), Some(2.0)],
                vec![Some(101.0), Some(1.0)],
                vec![Some(100.0), Some(0.5)],
            ],
        };
        let payload = HttpDataSource::convert_data(wire).unwrap();
        assert_eq!(payload.labels, vec!["user"]);
        assert_eq!(payload.points(), 3);
        assert_eq!(payload.rows[0].timestamp_ms, 100_000);
        assert_eq!(payload.rows[2].values, vec![Some(2.0)]);
        assert_eq!(payload.update_every_ms, 1000);
    }

    #[test]
    fn test_convert_chart_normalizes_to_ms() {
        let mut dimensions = HashMap::new();
        dimensions.insert("u".to_string(), WireDimension { name: "user".to_string() });
        let wire = WireChart {
            id: "system.cpu".into(),
            title: String::new(),
            units: "percentage".into(),
            update_every: 1,
            first_entry: 1000,
            last_entry: 2000,
            dimensions,
        };
        let meta = HttpDataSource::convert_chart(wire);
        assert_eq!(meta.title, "system.cpu");
        assert_eq!(meta.update_every_ms, 1000);
        assert_eq!(meta.retention(), (1_000_000, 2_000_000));
        assert_eq!(meta.dimensions, vec!["user"]);
    }
}
