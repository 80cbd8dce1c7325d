//! Metric query builder.
//!
//! Expands running targets × metric definitions into one batch of
//! uniquely identified queries. Every query id is recorded in a side
//! table so the correlator can map results back to their owner without
//! ever parsing the id string.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::debug;

use vigil_core::config::CloudSettings;
use vigil_core::{
    Aggregation, MetricDefinition, MetricQuery, QueryId, Target, TimeWindow, Verdict, VerdictStatus,
    VigilError, VigilResult,
};

/// Longest query id the backend accepts.
pub const MAX_QUERY_ID_LEN: usize = 255;

/// Label used on the single verdict recorded for a skipped target.
pub const SKIPPED_LABEL: &str = "all metrics";

/// Window, period and statistic applied to every query in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub lookback: Duration,
    pub period: Duration,
    pub aggregation: Aggregation,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(15 * 60),
            period: Duration::from_secs(300),
            aggregation: Aggregation::Average,
        }
    }
}

impl From<&CloudSettings> for QueryPolicy {
    fn from(settings: &CloudSettings) -> Self {
        Self {
            lookback: settings.lookback,
            period: settings.period,
            aggregation: settings.aggregation,
        }
    }
}

/// The batch for one run plus the side table used to decode results.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// All discovered targets, in directory order.
    targets: Vec<Target>,
    /// One `Skipped` verdict per non-running target.
    skipped: Vec<Verdict>,
    queries: Vec<MetricQuery>,
    /// query_id → position in `queries`.
    index: HashMap<QueryId, usize>,
}

impl QueryPlan {
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn queries(&self) -> &[MetricQuery] {
        &self.queries
    }

    pub fn skipped(&self) -> &[Verdict] {
        &self.skipped
    }

    pub fn skipped_verdict(&self, target_id: &str) -> Option<&Verdict> {
        self.skipped.iter().find(|v| v.subject == target_id)
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Decode a query id back to its (target, metric).
    pub fn resolve(&self, query_id: &str) -> Option<(&Target, &MetricDefinition)> {
        self.index_of(query_id).map(|i| {
            let q = &self.queries[i];
            (&q.target, &q.metric)
        })
    }

    pub(crate) fn index_of(&self, query_id: &str) -> Option<usize> {
        self.index.get(query_id).copied()
    }

    /// Split the batch into backend-sized requests.
    pub fn chunks(&self, max_per_request: usize) -> std::slice::Chunks<'_, MetricQuery> {
        self.queries.chunks(max_per_request.max(1))
    }
}

/// Build a backend-safe query id for (target, metric).
///
/// Characters outside `[A-Za-z0-9_]` become `_` and the metric name is
/// lower-cased. The `m_` prefix guarantees the id starts with a lowercase
/// letter. Distinct inputs can collide (`i-a` and `i_a`); collisions are
/// detected by [`build_queries`].
pub fn encode_query_id(target_id: &str, metric_name: &str) -> QueryId {
    format!(
        "m_{}_{}",
        sanitize(target_id),
        sanitize(&metric_name.to_ascii_lowercase())
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Expand targets × metrics into a batched query plan.
///
/// Non-running targets are recorded as `Skipped` and get no queries.
/// Fails with `Configuration` when the directory repeats a target id or
/// two queries would share an id.
pub fn build_queries(
    targets: &[Target],
    metrics: &[MetricDefinition],
    window: TimeWindow,
    policy: &QueryPolicy,
) -> VigilResult<QueryPlan> {
    let mut seen_targets = HashSet::new();
    let mut skipped = Vec::new();
    let mut queries = Vec::with_capacity(targets.len() * metrics.len());
    let mut index = HashMap::with_capacity(targets.len() * metrics.len());

    for target in targets {
        if !seen_targets.insert(target.id.as_str()) {
            return Err(VigilError::Configuration(format!(
                "target {} appears more than once in the directory",
                target.id
            )));
        }

        if !target.state.is_running() {
            debug!(
                target = %target.id,
                state = %target.state.label(),
                "skipping non-running target"
            );
            skipped.push(Verdict {
                subject: target.id.clone(),
                metric_label: SKIPPED_LABEL.to_string(),
                status: VerdictStatus::Skipped,
                value: None,
            });
            continue;
        }

        for metric in metrics {
            let query_id = encode_query_id(&target.id, &metric.name);
            if query_id.len() > MAX_QUERY_ID_LEN {
                return Err(VigilError::Configuration(format!(
                    "query id for {}/{} exceeds {MAX_QUERY_ID_LEN} characters",
                    target.id, metric.name
                )));
            }
            if let Some(&existing) = index.get(&query_id) {
                let other: &MetricQuery = &queries[existing];
                return Err(VigilError::Configuration(format!(
                    "ambiguous query id {query_id}: {}/{} and {}/{} encode identically",
                    other.target.id, other.metric.name, target.id, metric.name
                )));
            }
            index.insert(query_id.clone(), queries.len());
            queries.push(MetricQuery {
                query_id,
                target: target.clone(),
                metric: metric.clone(),
                window,
                period: policy.period,
                aggregation: policy.aggregation,
            });
        }
    }

    debug!(
        queries = queries.len(),
        skipped = skipped.len(),
        "query plan built"
    );

    Ok(QueryPlan {
        targets: targets.to_vec(),
        skipped,
        queries,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vigil_core::config::{Thresholds, builtin_metrics};
    use vigil_core::TargetState;

    fn metrics() -> Vec<MetricDefinition> {
        builtin_metrics(&Thresholds {
            cpu: 80.0,
            memory: 75.0,
            disk: 90.0,
            extra: Default::default(),
        })
    }

    fn window() -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 15, 0).unwrap();
        TimeWindow::ending_at(end, Duration::from_secs(900)).unwrap()
    }

    fn running(id: &str) -> Target {
        Target::cloud_instance(id, TargetState::Running)
    }

    #[test]
    fn encode_matches_backend_charset() {
        let id = encode_query_id("i-0abc123", "CPUUtilization");
        assert_eq!(id, "m_i_0abc123_cpuutilization");
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        assert!(id.starts_with(|c: char| c.is_ascii_lowercase()));
    }

    #[test]
    fn cross_product_for_running_targets() {
        let targets = vec![running("i-aaa"), running("i-bbb")];
        let plan = build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap();
        assert_eq!(plan.len(), 6);
        assert!(plan.skipped().is_empty());

        let q = &plan.queries()[0];
        assert_eq!(q.period, Duration::from_secs(300));
        assert_eq!(q.aggregation, Aggregation::Average);
        assert_eq!(q.window, window());
    }

    #[test]
    fn non_running_targets_are_skipped_without_queries() {
        let targets = vec![
            Target::cloud_instance("i-aaa", TargetState::Stopped),
            Target::cloud_instance("i-ccc", TargetState::Other("pending".to_string())),
            running("i-bbb"),
        ];
        let plan = build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap();

        assert_eq!(plan.len(), 3);
        assert!(plan.queries().iter().all(|q| q.target.id == "i-bbb"));
        assert_eq!(plan.skipped().len(), 2);

        let v = plan.skipped_verdict("i-aaa").unwrap();
        assert_eq!(v.status, VerdictStatus::Skipped);
        assert_eq!(v.value, None);
        assert_eq!(plan.targets().len(), 3);
    }

    #[test]
    fn resolve_round_trips_ids_containing_delimiter() {
        let targets = vec![running("web_01-a"), running("i-abc_def-123")];
        let plan = build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap();

        for target in &targets {
            for metric in metrics() {
                let id = encode_query_id(&target.id, &metric.name);
                let (t, m) = plan.resolve(&id).unwrap();
                assert_eq!(t.id, target.id);
                assert_eq!(m.name, metric.name);
            }
        }
        assert!(plan.resolve("m_unknown_cpuutilization").is_none());
    }

    #[test]
    fn colliding_ids_are_a_configuration_error() {
        let targets = vec![running("i-abc"), running("i_abc")];
        let err =
            build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
        assert!(err.to_string().contains("ambiguous query id"));
    }

    #[test]
    fn duplicate_target_is_a_configuration_error() {
        let targets = vec![running("i-abc"), running("i-abc")];
        let err =
            build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
    }

    #[test]
    fn overlong_id_rejected() {
        let long = "x".repeat(300);
        let err = build_queries(&[running(&long)], &metrics(), window(), &QueryPolicy::default())
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn chunks_respect_limit() {
        let targets: Vec<_> = (0..3).map(|i| running(&format!("i-{i}"))).collect();
        let plan = build_queries(&targets, &metrics(), window(), &QueryPolicy::default()).unwrap();
        let sizes: Vec<_> = plan.chunks(4).map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 1]);
        assert_eq!(plan.chunks(0).count(), 9);
    }
}
