//! Threshold evaluator.

use std::collections::HashMap;

use tracing::debug;

use vigil_core::{MetricDefinition, Verdict, VerdictStatus};

/// Threshold per metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    thresholds: HashMap<String, f64>,
}

impl ThresholdTable {
    pub fn from_metrics(metrics: &[MetricDefinition]) -> Self {
        Self {
            thresholds: metrics
                .iter()
                .map(|m| (m.name.clone(), m.threshold))
                .collect(),
        }
    }

    pub fn insert(&mut self, metric_name: impl Into<String>, threshold: f64) {
        self.thresholds.insert(metric_name.into(), threshold);
    }

    pub fn get(&self, metric_name: &str) -> Option<f64> {
        self.thresholds.get(metric_name).copied()
    }
}

/// Strict greater-than: a value equal to the threshold is OK.
pub fn classify(value: f64, threshold: f64) -> VerdictStatus {
    if value > threshold {
        VerdictStatus::Alert
    } else {
        VerdictStatus::Ok
    }
}

/// Classify one observation.
///
/// A missing value is `NoData` whatever the metric. Otherwise a metric
/// with no configured threshold yields `None` and is left out of the
/// report.
pub fn evaluate(
    subject: &str,
    metric_name: &str,
    label: &str,
    value: Option<f64>,
    thresholds: &ThresholdTable,
) -> Option<Verdict> {
    let status = match value {
        None => VerdictStatus::NoData,
        Some(v) => match thresholds.get(metric_name) {
            Some(threshold) => classify(v, threshold),
            None => {
                debug!(%subject, metric = %metric_name, "no threshold for metric, dropped");
                return None;
            }
        },
    };

    Some(Verdict {
        subject: subject.to_string(),
        metric_label: label.to_string(),
        status,
        value,
    })
}
