//! Local-path health check.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use vigil_core::config::{AggregationPolicy, Thresholds, builtin_metrics};
use vigil_core::{HealthReport, MetricDefinition, SubjectReport, VigilError, VigilResult};
use vigil_engine::{TargetDirectory, ThresholdTable, aggregate_local, evaluate};

use crate::probe::{ServiceProbe, spawn_probes};
use crate::sampler::HostSampler;

/// Host metrics plus OS service liveness for the current machine.
pub struct LocalCheck<'a> {
    directory: &'a dyn TargetDirectory,
    sampler: &'a dyn HostSampler,
    probe: Arc<dyn ServiceProbe>,
    metrics: Vec<MetricDefinition>,
    services: Vec<String>,
    probe_timeout: Duration,
    policy: AggregationPolicy,
}

impl<'a> LocalCheck<'a> {
    pub fn new(
        directory: &'a dyn TargetDirectory,
        sampler: &'a dyn HostSampler,
        probe: Arc<dyn ServiceProbe>,
        thresholds: &Thresholds,
        services: Vec<String>,
        probe_timeout: Duration,
        policy: AggregationPolicy,
    ) -> Self {
        Self {
            directory,
            sampler,
            probe,
            metrics: builtin_metrics(thresholds),
            services,
            probe_timeout,
            policy,
        }
    }

    pub async fn run(&self) -> VigilResult<HealthReport> {
        let host = self
            .directory
            .list_targets()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VigilError::Discovery("no local host target".to_string()))?;

        // Probes run while the CPU sample window is open.
        let pending = spawn_probes(Arc::clone(&self.probe), &self.services, self.probe_timeout);
        let snapshot = self.sampler.sample().await;

        let thresholds = ThresholdTable::from_metrics(&self.metrics);
        let verdicts = self
            .metrics
            .iter()
            .filter_map(|m| {
                evaluate(
                    &host.id,
                    &m.name,
                    &m.label,
                    snapshot.value_for(&m.name),
                    &thresholds,
                )
            })
            .collect();

        let services = pending.collect().await;
        let report = aggregate_local(
            SubjectReport {
                subject: host.id,
                state: host.state,
                verdicts,
            },
            services,
            &self.policy,
        );
        info!(overall = report.overall.label(), "local health check complete");
        Ok(report)
    }
}
