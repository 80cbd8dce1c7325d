//! Domain types shared by every stage of a health-check run.
//!
//! All of these are value objects owned by a single run. Nothing here is
//! persisted or shared across runs.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VigilError, VigilResult};

/// Identifier of a monitored target (instance id or host name).
pub type TargetId = String;

/// Identifier of a single query inside a batched metric request.
pub type QueryId = String;

// ── Target ────────────────────────────────────────────────────────

/// A monitored unit: a cloud instance or the local host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub kind: TargetKind,
    pub state: TargetState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    CloudInstance,
    LocalHost,
}

/// Lifecycle state of a target at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Running,
    Stopped,
    Other(String),
}

impl TargetState {
    /// Map a backend state name ("running", "stopped", "pending", ...).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "running" => TargetState::Running,
            "stopped" => TargetState::Stopped,
            other => TargetState::Other(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TargetState::Running)
    }

    pub fn label(&self) -> String {
        match self {
            TargetState::Running => "RUNNING".to_string(),
            TargetState::Stopped => "STOPPED".to_string(),
            TargetState::Other(name) => name.to_ascii_uppercase(),
        }
    }
}

impl Target {
    pub fn cloud_instance(id: impl Into<String>, state: TargetState) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::CloudInstance,
            state,
        }
    }

    pub fn local_host(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: TargetKind::LocalHost,
            state: TargetState::Running,
        }
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// A named, namespaced metric with the threshold it is judged against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Backend metric name (e.g. "CPUUtilization").
    pub name: String,
    /// Backend namespace (e.g. "AWS/EC2").
    pub namespace: String,
    /// Human display name (e.g. "CPU Usage").
    pub label: String,
    /// Values strictly above this raise an alert.
    pub threshold: f64,
}

/// Start and end of the lookback window for a batch of queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window of `lookback` ending at `end`.
    ///
    /// Fails with `Configuration` when the start would fall outside the
    /// representable date range.
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> VigilResult<Self> {
        let start = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|lookback| end.checked_sub_signed(lookback))
            .ok_or_else(|| {
                VigilError::Configuration(format!(
                    "lookback of {lookback:?} before {end} is out of range"
                ))
            })?;
        Ok(Self { start, end })
    }
}

/// Statistic the backend applies over each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Aggregation {
    #[default]
    Average,
    Maximum,
    Minimum,
    Sum,
    SampleCount,
}

impl Aggregation {
    /// Backend statistic spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Maximum => "Maximum",
            Aggregation::Minimum => "Minimum",
            Aggregation::Sum => "Sum",
            Aggregation::SampleCount => "SampleCount",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Average" => Some(Aggregation::Average),
            "Maximum" => Some(Aggregation::Maximum),
            "Minimum" => Some(Aggregation::Minimum),
            "Sum" => Some(Aggregation::Sum),
            "SampleCount" => Some(Aggregation::SampleCount),
            _ => None,
        }
    }
}

/// One metric query for one target inside a batched request.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub query_id: QueryId,
    pub target: Target,
    pub metric: MetricDefinition,
    pub window: TimeWindow,
    pub period: Duration,
    pub aggregation: Aggregation,
}

/// A single data point returned by the metrics backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Backend answer for one query. Empty `samples` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub query_id: QueryId,
    pub label: String,
    pub samples: Vec<Sample>,
}

// ── Verdicts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Ok,
    Alert,
    NoData,
    /// Target was not running; nothing was queried.
    Skipped,
}

impl VerdictStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerdictStatus::Ok => "OK",
            VerdictStatus::Alert => "ALERT",
            VerdictStatus::NoData => "NO DATA",
            VerdictStatus::Skipped => "SKIPPED",
        }
    }
}

/// Classification of one metric observation for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub subject: String,
    pub metric_label: String,
    pub status: VerdictStatus,
    pub value: Option<f64>,
}

impl Verdict {
    /// Value formatted as a two-decimal percentage, or "N/A".
    pub fn display_value(&self) -> String {
        match self.value {
            Some(v) => format!("{v:.2}%"),
            None => "N/A".to_string(),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            VerdictStatus::Ok | VerdictStatus::Alert => write!(
                f,
                "{}: {} ({})",
                self.metric_label,
                self.status.label(),
                self.display_value()
            ),
            VerdictStatus::NoData | VerdictStatus::Skipped => {
                write!(f, "{}: {}", self.metric_label, self.status.label())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Running,
    NotRunning,
}

impl ServiceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::NotRunning => "NOT RUNNING",
        }
    }
}

/// Liveness of one configured OS service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVerdict {
    pub service: String,
    pub status: ServiceStatus,
    /// Why the probe could not run, when it failed to execute.
    pub detail: Option<String>,
}

// ── Report ────────────────────────────────────────────────────────

/// All verdicts for one target, in metric order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectReport {
    pub subject: String,
    pub state: TargetState,
    pub verdicts: Vec<Verdict>,
}

impl SubjectReport {
    pub fn is_skipped(&self) -> bool {
        self.verdicts
            .iter()
            .all(|v| v.status == VerdictStatus::Skipped)
            && !self.verdicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Overall {
    Healthy,
    Attention,
}

impl Overall {
    pub fn label(&self) -> &'static str {
        match self {
            Overall::Healthy => "HEALTHY",
            Overall::Attention => "ATTENTION",
        }
    }
}

/// Every verdict of a run plus the folded decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Per-target verdicts, in directory order.
    pub subjects: Vec<SubjectReport>,
    /// Service verdicts, in configured order. Empty on the cloud path.
    pub services: Vec<ServiceVerdict>,
    pub overall: Overall,
}

impl HealthReport {
    pub fn subject(&self, id: &str) -> Option<&SubjectReport> {
        self.subjects.iter().find(|s| s.subject == id)
    }

    pub fn verdicts(&self) -> impl Iterator<Item = &Verdict> {
        self.subjects.iter().flat_map(|s| s.verdicts.iter())
    }
}
