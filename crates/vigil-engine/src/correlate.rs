//! Metric correlator.
//!
//! Maps a batched backend response back onto the query plan through the
//! plan's side table and reduces each series to its latest value.

use tracing::{debug, warn};

use vigil_core::{MetricDefinition, MetricResult, Sample, Target};

use crate::query::QueryPlan;

/// Latest observation for one (target, metric) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedMetric {
    pub metric: MetricDefinition,
    /// Backend label, or the metric's configured label when the backend
    /// sent none.
    pub label: String,
    /// `None` when the window held no usable samples.
    pub value: Option<f64>,
}

/// Correlated metrics for one running target, in metric order.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetMetrics {
    pub target: Target,
    pub metrics: Vec<CorrelatedMetric>,
}

/// Per-target correlation result, in directory order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Correlation {
    entries: Vec<TargetMetrics>,
}

impl Correlation {
    pub fn get(&self, target_id: &str) -> Option<&[CorrelatedMetric]> {
        self.entries
            .iter()
            .find(|e| e.target.id == target_id)
            .map(|e| e.metrics.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetMetrics> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Correlate backend results with the plan that produced them.
///
/// Results whose id is not in the plan are ignored. Several results for
/// the same id (a paginated response) are merged. A query with no result
/// at all is reported with no value.
pub fn correlate(results: &[MetricResult], plan: &QueryPlan) -> Correlation {
    let queries = plan.queries();
    let mut samples: Vec<Vec<Sample>> = vec![Vec::new(); queries.len()];
    let mut labels: Vec<Option<String>> = vec![None; queries.len()];
    let mut answered = vec![false; queries.len()];

    for result in results {
        let Some(i) = plan.index_of(&result.query_id) else {
            warn!(query_id = %result.query_id, "result for unknown query id ignored");
            continue;
        };
        answered[i] = true;
        samples[i].extend_from_slice(&result.samples);
        if labels[i].is_none() && !result.label.is_empty() {
            labels[i] = Some(result.label.clone());
        }
    }

    let mut entries: Vec<TargetMetrics> = Vec::new();
    for (i, query) in queries.iter().enumerate() {
        if !answered[i] {
            debug!(query_id = %query.query_id, "no result returned for query");
        }
        let metric = CorrelatedMetric {
            metric: query.metric.clone(),
            label: labels[i]
                .take()
                .unwrap_or_else(|| query.metric.label.clone()),
            value: latest_value(&samples[i]),
        };
        // Queries are laid out target by target, so a change of target id
        // starts a new group.
        match entries.last_mut() {
            Some(last) if last.target.id == query.target.id => last.metrics.push(metric),
            _ => entries.push(TargetMetrics {
                target: query.target.clone(),
                metrics: vec![metric],
            }),
        }
    }

    Correlation { entries }
}

/// Value of the most recent finite sample.
///
/// Ties on timestamp go to the later entry, so a chronological list
/// yields its last element.
pub fn latest_value(samples: &[Sample]) -> Option<f64> {
    let mut latest: Option<&Sample> = None;
    for sample in samples.iter().filter(|s| s.value.is_finite()) {
        match latest {
            Some(best) if sample.timestamp < best.timestamp => {}
            _ => latest = Some(sample),
        }
    }
    latest.map(|s| s.value)
}
