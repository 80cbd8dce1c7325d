//! config.toml parser.
//!
//! The file is read once per run into a [`VigilConfig`], validated, and
//! then passed by reference to whichever path (cloud or local) runs.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{VigilError, VigilResult};
use crate::types::{Aggregation, MetricDefinition};

pub const CPU_UTILIZATION: &str = "CPUUtilization";
pub const MEM_USED_PERCENT: &str = "mem_used_percent";
pub const DISK_USED_PERCENT: &str = "disk_used_percent";

/// Upper bound on queries in a single GetMetricData call.
pub const BACKEND_QUERY_LIMIT: usize = 500;

/// Longest lookback worth asking for; CloudWatch keeps 455 days.
pub const MAX_LOOKBACK: Duration = Duration::from_secs(455 * 24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// OS services probed on the local path.
    #[serde(default)]
    pub services: Vec<String>,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub policy: AggregationPolicy,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub local: LocalConfig,
    /// Replaces the built-in metric set on the cloud path.
    pub metrics: Option<Vec<MetricConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    /// Extra named thresholds referenced from `[[metrics]]`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl Thresholds {
    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "cpu" => Some(self.cpu),
            "memory" => Some(self.memory),
            "disk" => Some(self.disk),
            other => self.extra.get(other).copied(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        [("cpu", self.cpu), ("memory", self.memory), ("disk", self.disk)]
            .into_iter()
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

/// How verdicts fold into the overall decision. Applies to both paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationPolicy {
    /// Treat a metric with no samples as a failure.
    #[serde(default)]
    pub fail_on_no_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub region: String,
    /// Restrict discovery to these instance ids. Empty means all.
    pub instance_ids: Vec<String>,
    pub lookback: String,
    pub period: String,
    pub statistic: String,
    pub max_queries_per_request: usize,
    pub chunk_retries: u32,
    pub call_timeout: String,
    /// Path or name of the AWS CLI executable.
    pub aws_cli: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            instance_ids: Vec::new(),
            lookback: "15m".to_string(),
            period: "300s".to_string(),
            statistic: "Average".to_string(),
            max_queries_per_request: BACKEND_QUERY_LIMIT,
            chunk_retries: 1,
            call_timeout: "10s".to_string(),
            aws_cli: "aws".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub log_file: PathBuf,
    /// Mount point whose usage is reported as disk usage.
    pub disk_path: PathBuf,
    /// How long CPU usage is measured for.
    pub cpu_sample: String,
    /// Program and leading arguments; the service name is appended.
    pub probe_command: Vec<String>,
    pub probe_timeout: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("health_monitor.log"),
            disk_path: default_disk_path(),
            cpu_sample: "1s".to_string(),
            probe_command: default_probe_command(),
            probe_timeout: "10s".to_string(),
        }
    }
}

#[cfg(windows)]
fn default_disk_path() -> PathBuf {
    PathBuf::from("C:\\")
}

#[cfg(not(windows))]
fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

#[cfg(windows)]
fn default_probe_command() -> Vec<String> {
    ["powershell", "-NoProfile", "-Command", "Get-Service", "-Name"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(not(windows))]
fn default_probe_command() -> Vec<String> {
    ["systemctl", "is-active", "--quiet"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One `[[metrics]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    pub namespace: String,
    pub label: Option<String>,
    pub threshold: ThresholdRef,
}

/// A threshold given either by `[thresholds]` key or as a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdRef {
    Value(f64),
    Key(String),
}

/// Resolved cloud-path settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudSettings {
    pub region: String,
    pub instance_ids: Vec<String>,
    pub lookback: Duration,
    pub period: Duration,
    pub aggregation: Aggregation,
    pub max_queries_per_request: usize,
    pub chunk_retries: u32,
    pub call_timeout: Duration,
    pub aws_cli: String,
}

/// Resolved local-path settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSettings {
    pub log_file: PathBuf,
    pub disk_path: PathBuf,
    pub cpu_sample: Duration,
    pub probe_command: Vec<String>,
    pub probe_timeout: Duration,
}

impl VigilConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> VigilResult<Self> {
        let config: VigilConfig = toml::from_str(content)
            .map_err(|e| VigilError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without touching a backend.
    pub fn validate(&self) -> VigilResult<()> {
        for (key, value) in self.thresholds.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(VigilError::Configuration(format!(
                    "threshold {key} must be a non-negative number, got {value}"
                )));
            }
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.trim().is_empty() {
                return Err(VigilError::Configuration(
                    "service names must not be empty".to_string(),
                ));
            }
            if !seen.insert(service.as_str()) {
                return Err(VigilError::Configuration(format!(
                    "service {service} is listed twice"
                )));
            }
        }
        self.metric_definitions()?;
        self.cloud_settings()?;
        self.local_settings()?;
        Ok(())
    }

    /// Metric set queried on the cloud path.
    ///
    /// Falls back to the built-in CPU / memory / disk triple when no
    /// `[[metrics]]` entries are configured.
    pub fn metric_definitions(&self) -> VigilResult<Vec<MetricDefinition>> {
        let Some(metrics) = &self.metrics else {
            return Ok(builtin_metrics(&self.thresholds));
        };
        if metrics.is_empty() {
            return Err(VigilError::Configuration(
                "[[metrics]] is present but empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut defs = Vec::with_capacity(metrics.len());
        for m in metrics {
            if m.name.trim().is_empty() || m.namespace.trim().is_empty() {
                return Err(VigilError::Configuration(
                    "metric name and namespace must not be empty".to_string(),
                ));
            }
            if !names.insert(m.name.as_str()) {
                return Err(VigilError::Configuration(format!(
                    "metric {} is defined twice",
                    m.name
                )));
            }
            let threshold = match &m.threshold {
                ThresholdRef::Value(v) => *v,
                ThresholdRef::Key(key) => self.thresholds.get(key).ok_or_else(|| {
                    VigilError::Configuration(format!(
                        "metric {} references unknown threshold {key}",
                        m.name
                    ))
                })?,
            };
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(VigilError::Configuration(format!(
                    "metric {} has invalid threshold {threshold}",
                    m.name
                )));
            }
            defs.push(MetricDefinition {
                name: m.name.clone(),
                namespace: m.namespace.clone(),
                label: m.label.clone().unwrap_or_else(|| m.name.clone()),
                threshold,
            });
        }
        Ok(defs)
    }

    pub fn cloud_settings(&self) -> VigilResult<CloudSettings> {
        let c = &self.cloud;
        if c.region.trim().is_empty() {
            return Err(VigilError::Configuration("cloud.region must not be empty".to_string()));
        }
        let lookback = required_duration("cloud.lookback", &c.lookback)?;
        if lookback > MAX_LOOKBACK {
            return Err(VigilError::Configuration(format!(
                "cloud.lookback must not exceed 455 days, got {}",
                c.lookback
            )));
        }
        let period = required_duration("cloud.period", &c.period)?;
        if period.as_secs() % 60 != 0 || period.subsec_nanos() != 0 {
            return Err(VigilError::Configuration(format!(
                "cloud.period must be a multiple of 60s, got {}",
                c.period
            )));
        }
        if period > lookback {
            return Err(VigilError::Configuration(
                "cloud.period must not exceed cloud.lookback".to_string(),
            ));
        }
        let aggregation = Aggregation::parse(&c.statistic).ok_or_else(|| {
            VigilError::Configuration(format!("unknown statistic {}", c.statistic))
        })?;
        if c.max_queries_per_request == 0 || c.max_queries_per_request > BACKEND_QUERY_LIMIT {
            return Err(VigilError::Configuration(format!(
                "cloud.max_queries_per_request must be within 1..={BACKEND_QUERY_LIMIT}"
            )));
        }
        Ok(CloudSettings {
            region: c.region.clone(),
            instance_ids: c.instance_ids.clone(),
            lookback,
            period,
            aggregation,
            max_queries_per_request: c.max_queries_per_request,
            chunk_retries: c.chunk_retries,
            call_timeout: required_duration("cloud.call_timeout", &c.call_timeout)?,
            aws_cli: c.aws_cli.clone(),
        })
    }

    pub fn local_settings(&self) -> VigilResult<LocalSettings> {
        let l = &self.local;
        if l.probe_command.is_empty() {
            return Err(VigilError::Configuration(
                "local.probe_command must name a program".to_string(),
            ));
        }
        Ok(LocalSettings {
            log_file: l.log_file.clone(),
            disk_path: l.disk_path.clone(),
            cpu_sample: required_duration("local.cpu_sample", &l.cpu_sample)?,
            probe_command: l.probe_command.clone(),
            probe_timeout: required_duration("local.probe_timeout", &l.probe_timeout)?,
        })
    }
}

/// The fixed CPU / memory / disk metric triple.
pub fn builtin_metrics(thresholds: &Thresholds) -> Vec<MetricDefinition> {
    vec![
        MetricDefinition {
            name: CPU_UTILIZATION.to_string(),
            namespace: "AWS/EC2".to_string(),
            label: "CPU Usage".to_string(),
            threshold: thresholds.cpu,
        },
        MetricDefinition {
            name: MEM_USED_PERCENT.to_string(),
            namespace: "CWAgent".to_string(),
            label: "Memory Usage".to_string(),
            threshold: thresholds.memory,
        },
        MetricDefinition {
            name: DISK_USED_PERCENT.to_string(),
            namespace: "CWAgent".to_string(),
            label: "Disk Usage".to_string(),
            threshold: thresholds.disk,
        },
    ]
}

fn required_duration(field: &str, value: &str) -> VigilResult<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(VigilError::Configuration(format!(
            "{field} must be a non-zero duration, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
services = ["sshd", "cron"]

[thresholds]
cpu = 80
memory = 75.5
disk = 90
"#;

    #[test]
    fn parse_minimal() {
        let config = VigilConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.services, vec!["sshd", "cron"]);
        assert_eq!(config.thresholds.memory, 75.5);
        assert!(!config.policy.fail_on_no_data);

        let cloud = config.cloud_settings().unwrap();
        assert_eq!(cloud.region, "us-east-1");
        assert_eq!(cloud.lookback, Duration::from_secs(900));
        assert_eq!(cloud.period, Duration::from_secs(300));
        assert_eq!(cloud.aggregation, Aggregation::Average);
        assert_eq!(cloud.max_queries_per_request, 500);
        assert_eq!(cloud.call_timeout, Duration::from_secs(10));

        let local = config.local_settings().unwrap();
        assert_eq!(local.log_file, PathBuf::from("health_monitor.log"));
        assert_eq!(local.cpu_sample, Duration::from_secs(1));
    }

    #[test]
    fn builtin_metric_set_uses_thresholds() {
        let config = VigilConfig::from_toml_str(MINIMAL).unwrap();
        let metrics = config.metric_definitions().unwrap();
        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec![CPU_UTILIZATION, MEM_USED_PERCENT, DISK_USED_PERCENT]);
        assert_eq!(metrics[0].namespace, "AWS/EC2");
        assert_eq!(metrics[1].threshold, 75.5);
        assert_eq!(metrics[2].namespace, "CWAgent");
    }

    #[test]
    fn missing_threshold_is_configuration_error() {
        let err = VigilConfig::from_toml_str("[thresholds]\ncpu = 80\nmemory = 75\n").unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
        assert!(err.to_string().contains("disk"));
    }

    #[test]
    fn negative_threshold_rejected() {
        let err = VigilConfig::from_toml_str("[thresholds]\ncpu = -1\nmemory = 75\ndisk = 90\n")
            .unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
    }

    #[test]
    fn custom_metrics_resolve_threshold_keys() {
        let toml_str = r#"
[thresholds]
cpu = 80
memory = 75
disk = 90
swap = 20

[[metrics]]
name = "CPUUtilization"
namespace = "AWS/EC2"
threshold = "cpu"

[[metrics]]
name = "swap_used_percent"
namespace = "CWAgent"
label = "Swap Usage"
threshold = "swap"

[[metrics]]
name = "NetworkIn"
namespace = "AWS/EC2"
threshold = 1000000
"#;
        let config = VigilConfig::from_toml_str(toml_str).unwrap();
        let metrics = config.metric_definitions().unwrap();
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].label, "CPUUtilization");
        assert_eq!(metrics[1].label, "Swap Usage");
        assert_eq!(metrics[1].threshold, 20.0);
        assert_eq!(metrics[2].threshold, 1_000_000.0);
    }

    #[test]
    fn unknown_threshold_key_rejected() {
        let toml_str = r#"
[thresholds]
cpu = 80
memory = 75
disk = 90

[[metrics]]
name = "swap_used_percent"
namespace = "CWAgent"
threshold = "swap"
"#;
        let err = VigilConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("unknown threshold swap"));
    }

    #[test]
    fn duplicate_metric_rejected() {
        let toml_str = r#"
[thresholds]
cpu = 80
memory = 75
disk = 90

[[metrics]]
name = "CPUUtilization"
namespace = "AWS/EC2"
threshold = "cpu"

[[metrics]]
name = "CPUUtilization"
namespace = "AWS/EC2"
threshold = 50
"#;
        assert!(VigilConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn cloud_overrides_and_period_validation() {
        let toml_str = r#"
[thresholds]
cpu = 80
memory = 75
disk = 90

[cloud]
region = "eu-west-1"
lookback = "30m"
period = "60s"
statistic = "Maximum"
max_queries_per_request = 100
"#;
        let config = VigilConfig::from_toml_str(toml_str).unwrap();
        let cloud = config.cloud_settings().unwrap();
        assert_eq!(cloud.region, "eu-west-1");
        assert_eq!(cloud.lookback, Duration::from_secs(1800));
        assert_eq!(cloud.aggregation, Aggregation::Maximum);
        assert_eq!(cloud.max_queries_per_request, 100);

        let bad = toml_str.replace("period = \"60s\"", "period = \"90s\"");
        assert!(VigilConfig::from_toml_str(&bad).is_err());

        let bad = toml_str.replace(
            "max_queries_per_request = 100",
            "max_queries_per_request = 501",
        );
        assert!(VigilConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn duplicate_service_rejected() {
        let toml_str =
            "services = [\"sshd\", \"sshd\"]\n[thresholds]\ncpu = 1\nmemory = 1\ndisk = 1\n";
        assert!(VigilConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn from_file_reads_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = VigilConfig::from_file(file.path()).unwrap();
        assert_eq!(config.thresholds.cpu, 80.0);
    }

    #[test]
    fn from_file_missing_is_configuration_error() {
        let err = VigilConfig::from_file(Path::new("/nonexistent/vigil.toml")).unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
    }

    #[test]
    fn shipped_sample_config_is_valid() {
        let config = VigilConfig::from_toml_str(include_str!("../../../config.toml")).unwrap();
        assert_eq!(config.services, vec!["sshd", "cron"]);
        assert_eq!(config.cloud_settings().unwrap().max_queries_per_request, 500);
        assert_eq!(
            config.local_settings().unwrap().log_file,
            PathBuf::from("health_monitor.log")
        );
    }

    #[test]
    fn oversized_lookback_is_configuration_error() {
        let text = format!("{MINIMAL}\n[cloud]\nlookback = \"9000000000000s\"\n");
        let err = VigilConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
        assert!(err.to_string().contains("455 days"));

        let text = format!("{MINIMAL}\n[cloud]\nlookback = \"456h\"\n");
        let config = VigilConfig::from_toml_str(&text).unwrap();
        assert_eq!(
            config.cloud_settings().unwrap().lookback,
            Duration::from_secs(456 * 3600)
        );
    }

    #[test]
    fn overflowing_duration_is_configuration_error() {
        let text = format!("{MINIMAL}\n[cloud]\nlookback = \"307445734561825861m\"\n");
        let err = VigilConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, VigilError::Configuration(_)));
    }
}
