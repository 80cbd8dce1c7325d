//! CloudWatch `GetMetricData` request/response mapping.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vigil_core::{MetricQuery, MetricResult, Sample, VigilError, VigilResult};
use vigil_engine::{BoxFuture, MetricsBackend};

use crate::cli::AwsCli;

/// Dimension every built-in metric is keyed by.
const INSTANCE_DIMENSION: &str = "InstanceId";

// ── Request ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetMetricDataRequest {
    pub metric_data_queries: Vec<MetricDataQuery>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Oldest first, so the newest sample is last in each series.
    pub scan_by: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDataQuery {
    pub id: String,
    pub metric_stat: MetricStat,
    pub return_data: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MetricStat {
    pub metric: Metric,
    pub period: u64,
    pub stat: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Metric {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// Build the request body for one chunk of queries.
///
/// All queries in a plan share one window, so the first query's window
/// is used for the whole request.
pub fn build_request(batch: &[MetricQuery]) -> VigilResult<GetMetricDataRequest> {
    let first = batch
        .first()
        .ok_or_else(|| VigilError::BackendQuery("empty metric query batch".to_string()))?;

    Ok(GetMetricDataRequest {
        metric_data_queries: batch
            .iter()
            .map(|q| MetricDataQuery {
                id: q.query_id.clone(),
                metric_stat: MetricStat {
                    metric: Metric {
                        namespace: q.metric.namespace.clone(),
                        metric_name: q.metric.name.clone(),
                        dimensions: vec![Dimension {
                            name: INSTANCE_DIMENSION.to_string(),
                            value: q.target.id.clone(),
                        }],
                    },
                    period: q.period.as_secs(),
                    stat: q.aggregation.as_str(),
                },
                return_data: true,
            })
            .collect(),
        start_time: first.window.start,
        end_time: first.window.end,
        scan_by: "TimestampAscending",
    })
}

// ── Response ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetMetricDataOutput {
    #[serde(default)]
    metric_data_results: Vec<MetricDataResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricDataResult {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    values: Vec<f64>,
    #[serde(default)]
    status_code: Option<String>,
}

/// Parse `get-metric-data` JSON into metric results.
pub fn parse_response(json: &[u8]) -> VigilResult<Vec<MetricResult>> {
    let output: GetMetricDataOutput = serde_json::from_slice(json)
        .map_err(|e| VigilError::BackendQuery(format!("malformed get-metric-data output: {e}")))?;

    output
        .metric_data_results
        .into_iter()
        .map(|r| {
            if r.timestamps.len() != r.values.len() {
                return Err(VigilError::BackendQuery(format!(
                    "result {} has {} timestamps but {} values",
                    r.id,
                    r.timestamps.len(),
                    r.values.len()
                )));
            }
            match r.status_code.as_deref() {
                None | Some("Complete") | Some("PartialData") => {}
                Some(code) => warn!(query_id = %r.id, status = code, "metric result not complete"),
            }
            Ok(MetricResult {
                query_id: r.id,
                label: r.label,
                samples: r
                    .timestamps
                    .into_iter()
                    .zip(r.values)
                    .map(|(timestamp, value)| Sample { timestamp, value })
                    .collect(),
            })
        })
        .collect()
}

// ── Backends ──────────────────────────────────────────────────────

/// Queries CloudWatch through `aws cloudwatch get-metric-data`.
#[derive(Debug, Clone)]
pub struct CloudWatchBackend {
    cli: AwsCli,
}

impl CloudWatchBackend {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn query_chunk(&self, batch: &[MetricQuery]) -> VigilResult<Vec<MetricResult>> {
        let request = build_request(batch)?;
        let body = serde_json::to_vec(&request)
            .map_err(|e| VigilError::BackendQuery(format!("cannot encode request: {e}")))?;

        // A full chunk is too large for a single argv entry, so the body
        // goes through a temp file.
        let mut input = tempfile::NamedTempFile::new()
            .map_err(|e| VigilError::BackendQuery(format!("cannot create request file: {e}")))?;
        input
            .write_all(&body)
            .and_then(|_| input.flush())
            .map_err(|e| VigilError::BackendQuery(format!("cannot write request file: {e}")))?;
        let input_arg = format!("file://{}", input.path().display());

        debug!(queries = batch.len(), "sending get-metric-data request");
        let stdout = self
            .cli
            .run(["cloudwatch", "get-metric-data", "--cli-input-json", input_arg.as_str()])
            .await
            .map_err(VigilError::BackendQuery)?;

        parse_response(&stdout)
    }
}

impl MetricsBackend for CloudWatchBackend {
    fn query<'a>(
        &'a self,
        batch: &'a [MetricQuery],
    ) -> BoxFuture<'a, VigilResult<Vec<MetricResult>>> {
        Box::pin(self.query_chunk(batch))
    }
}

/// Serves results from a saved `get-metric-data` document.
///
/// Each call returns only the results whose ids are in the requested
/// chunk, the way the live backend would.
#[derive(Debug, Clone)]
pub struct ReplayBackend {
    results: Vec<MetricResult>,
}

impl ReplayBackend {
    pub fn new(results: Vec<MetricResult>) -> Self {
        Self { results }
    }

    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let json = std::fs::read(path).map_err(|e| {
            VigilError::BackendQuery(format!("cannot read {}: {e}", path.display()))
        })?;
        let results = parse_response(&json)?;
        info!(path = %path.display(), results = results.len(), "metric replay loaded");
        Ok(Self::new(results))
    }
}

impl MetricsBackend for ReplayBackend {
    fn query<'a>(
        &'a self,
        batch: &'a [MetricQuery],
    ) -> BoxFuture<'a, VigilResult<Vec<MetricResult>>> {
        Box::pin(async move {
            let ids: HashSet<&str> = batch.iter().map(|q| q.query_id.as_str()).collect();
            Ok(self
                .results
                .iter()
                .filter(|r| ids.contains(r.query_id.as_str()))
                .cloned()
                .collect())
        })
    }
}
