//! Cloud health-check pipeline.
//!
//! One call to [`CloudCheck::run`] performs a full snapshot-and-evaluate
//! pass. Nothing is carried over between runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use vigil_core::config::{AggregationPolicy, CloudSettings};
use vigil_core::{
    HealthReport, MetricDefinition, MetricResult, SubjectReport, Target, TimeWindow, VigilError,
    VigilResult,
};

use crate::aggregate::aggregate_fleet;
use crate::backend::MetricsBackend;
use crate::correlate::{Correlation, correlate};
use crate::directory::TargetDirectory;
use crate::evaluate::{ThresholdTable, evaluate};
use crate::query::{QueryPlan, QueryPolicy, build_queries};

/// Cloud-path health check over a directory and a metrics backend.
pub struct CloudCheck<'a> {
    directory: &'a dyn TargetDirectory,
    backend: &'a dyn MetricsBackend,
    metrics: Vec<MetricDefinition>,
    query_policy: QueryPolicy,
    aggregation_policy: AggregationPolicy,
    max_queries_per_request: usize,
    chunk_retries: u32,
    call_timeout: Duration,
}

impl<'a> CloudCheck<'a> {
    pub fn new(
        directory: &'a dyn TargetDirectory,
        backend: &'a dyn MetricsBackend,
        metrics: Vec<MetricDefinition>,
        settings: &CloudSettings,
        aggregation_policy: AggregationPolicy,
    ) -> Self {
        Self {
            directory,
            backend,
            metrics,
            query_policy: QueryPolicy::from(settings),
            aggregation_policy,
            max_queries_per_request: settings.max_queries_per_request,
            chunk_retries: settings.chunk_retries,
            call_timeout: settings.call_timeout,
        }
    }

    /// Run against the current wall-clock time.
    pub async fn run(&self) -> VigilResult<HealthReport> {
        self.run_at(Utc::now()).await
    }

    /// Run with the query window ending at `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> VigilResult<HealthReport> {
        let targets = self.discover().await?;
        info!(targets = targets.len(), "targets discovered");

        let window = TimeWindow::ending_at(now, self.query_policy.lookback)?;
        let plan = build_queries(&targets, &self.metrics, window, &self.query_policy)?;

        let results = self.fetch(&plan).await?;
        let correlation = correlate(&results, &plan);
        let thresholds = ThresholdTable::from_metrics(&self.metrics);
        let subjects = evaluate_plan(&plan, &correlation, &thresholds);

        let report = aggregate_fleet(subjects, &self.aggregation_policy);
        info!(overall = report.overall.label(), "cloud health check complete");
        Ok(report)
    }

    async fn discover(&self) -> VigilResult<Vec<Target>> {
        match tokio::time::timeout(self.call_timeout, self.directory.list_targets()).await {
            Ok(result) => result,
            Err(_) => Err(VigilError::Discovery(format!(
                "target enumeration timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Issue the plan in backend-sized chunks.
    ///
    /// Each chunk is retried on its own; a chunk that still fails after
    /// `chunk_retries` extra attempts fails the run.
    async fn fetch(&self, plan: &QueryPlan) -> VigilResult<Vec<MetricResult>> {
        let mut results = Vec::with_capacity(plan.len());
        if plan.is_empty() {
            debug!("no running targets, skipping metric queries");
            return Ok(results);
        }

        let chunk_count = plan.len().div_ceil(self.max_queries_per_request.max(1));
        info!(
            queries = plan.len(),
            chunks = chunk_count,
            "querying metrics backend"
        );

        for (n, chunk) in plan.chunks(self.max_queries_per_request).enumerate() {
            let mut attempt = 0;
            loop {
                let call = tokio::time::timeout(self.call_timeout, self.backend.query(chunk));
                let outcome = match call.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(VigilError::BackendQuery(format!(
                        "request timed out after {:?}",
                        self.call_timeout
                    ))),
                };
                match outcome {
                    Ok(batch) => {
                        debug!(chunk = n, results = batch.len(), "chunk answered");
                        results.extend(batch);
                        break;
                    }
                    Err(e) if attempt < self.chunk_retries => {
                        attempt += 1;
                        warn!(
                            chunk = n,
                            attempt,
                            error = %e,
                            "metric query failed, retrying chunk"
                        );
                    }
                    Err(e) => {
                        return Err(VigilError::BackendQuery(format!(
                            "chunk {} of {chunk_count} failed after {} attempt(s): {e}",
                            n + 1,
                            attempt + 1
                        )));
                    }
                }
            }
        }

        Ok(results)
    }
}

/// Turn a correlation into per-target reports, in directory order.
pub fn evaluate_plan(
    plan: &QueryPlan,
    correlation: &Correlation,
    thresholds: &ThresholdTable,
) -> Vec<SubjectReport> {
    plan.targets()
        .iter()
        .map(|target| {
            let verdicts = match plan.skipped_verdict(&target.id) {
                Some(skipped) => vec![skipped.clone()],
                None => correlation
                    .get(&target.id)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|m| {
                        evaluate(&target.id, &m.metric.name, &m.label, m.value, thresholds)
                    })
                    .collect(),
            };
            SubjectReport {
                subject: target.id.clone(),
                state: target.state.clone(),
                verdicts,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vigil_core::{MetricQuery, TargetState};

    use crate::backend::BoxFuture;
    use crate::directory::StaticDirectory;

    struct FailingDirectory;

    impl TargetDirectory for FailingDirectory {
        fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>> {
            Box::pin(async { Err(VigilError::Discovery("describe failed".to_string())) })
        }
    }

    struct SlowBackend;

    impl MetricsBackend for SlowBackend {
        fn query<'a>(
            &'a self,
            _batch: &'a [MetricQuery],
        ) -> BoxFuture<'a, VigilResult<Vec<MetricResult>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            })
        }
    }

    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl MetricsBackend for CountingBackend {
        fn query<'a>(
            &'a self,
            _batch: &'a [MetricQuery],
        ) -> BoxFuture<'a, VigilResult<Vec<MetricResult>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn settings() -> CloudSettings {
        CloudSettings {
            region: "us-east-1".to_string(),
            instance_ids: Vec::new(),
            lookback: Duration::from_secs(900),
            period: Duration::from_secs(300),
            aggregation: vigil_core::Aggregation::Average,
            max_queries_per_request: 500,
            chunk_retries: 1,
            call_timeout: Duration::from_secs(10),
            aws_cli: "aws".to_string(),
        }
    }

    fn metric() -> Vec<MetricDefinition> {
        vec![MetricDefinition {
            name: "CPUUtilization".to_string(),
            namespace: "AWS/EC2".to_string(),
            label: "CPU Usage".to_string(),
            threshold: 80.0,
        }]
    }

    #[tokio::test]
    async fn discovery_error_aborts_run() {
        let backend = CountingBackend { calls: AtomicUsize::new(0) };
        let check = CloudCheck::new(
            &FailingDirectory,
            &backend,
            metric(),
            &settings(),
            AggregationPolicy::default(),
        );
        let err = check.run().await.unwrap_err();
        assert!(matches!(err, VigilError::Discovery(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_stopped_fleet_makes_no_backend_call() {
        let dir = StaticDirectory::new(vec![Target::cloud_instance("i-aaa", TargetState::Stopped)]);
        let backend = CountingBackend { calls: AtomicUsize::new(0) };
        let check =
            CloudCheck::new(&dir, &backend, metric(), &settings(), AggregationPolicy::default());
        let report = check.run().await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(report.subjects[0].is_skipped());
    }

    #[tokio::test(start_paused = true)]
    async fn backend_timeout_is_a_backend_error() {
        let dir = StaticDirectory::new(vec![Target::cloud_instance("i-aaa", TargetState::Running)]);
        let mut s = settings();
        s.chunk_retries = 0;
        let check = CloudCheck::new(&dir, &SlowBackend, metric(), &s, AggregationPolicy::default());
        let err = check.run().await.unwrap_err();
        assert!(matches!(err, VigilError::BackendQuery(_)));
        assert!(err.to_string().contains("timed out"));
    }

    struct SlowDirectory;

    impl TargetDirectory for SlowDirectory {
        fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![Target::cloud_instance("i-aaa", TargetState::Running)])
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_timeout_is_a_discovery_error() {
        let backend = CountingBackend { calls: AtomicUsize::new(0) };
        let check = CloudCheck::new(
            &SlowDirectory,
            &backend,
            metric(),
            &settings(),
            AggregationPolicy::default(),
        );
        let err = check.run().await.unwrap_err();
        assert!(matches!(err, VigilError::Discovery(_)));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unrepresentable_window_is_a_configuration_error() {
        let dir = StaticDirectory::new(vec![Target::cloud_instance("i-aaa", TargetState::Running)]);
        let backend = CountingBackend { calls: AtomicUsize::new(0) };
        let mut s = settings();
        s.lookback = Duration::from_secs(9_000_000_000_000);
        let check = CloudCheck::new(&dir, &backend, metric(), &s, AggregationPolicy::default());
        let err = check.run().await.unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
