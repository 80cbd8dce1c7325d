//! Host resource sampling.
//!
//! Gathers OS-level CPU, memory and disk usage as percentages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Disks, System};
use tracing::{debug, warn};

use vigil_core::config::{CPU_UTILIZATION, DISK_USED_PERCENT, MEM_USED_PERCENT};
use vigil_engine::BoxFuture;

/// Point-in-time host usage. `None` means the value could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostSnapshot {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
}

impl HostSnapshot {
    /// Value for one of the built-in metric names.
    pub fn value_for(&self, metric_name: &str) -> Option<f64> {
        match metric_name {
            CPU_UTILIZATION => self.cpu_percent,
            MEM_USED_PERCENT => self.memory_percent,
            DISK_USED_PERCENT => self.disk_percent,
            _ => None,
        }
    }
}

/// Source of host usage snapshots.
pub trait HostSampler: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, HostSnapshot>;
}

/// Samples the current machine with `sysinfo`.
#[derive(Debug, Clone)]
pub struct SysinfoSampler {
    disk_path: PathBuf,
    cpu_sample: Duration,
}

impl SysinfoSampler {
    pub fn new(disk_path: impl Into<PathBuf>, cpu_sample: Duration) -> Self {
        Self {
            disk_path: disk_path.into(),
            // CPU usage needs two refreshes at least this far apart.
            cpu_sample: cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    fn sample_blocking(disk_path: &Path, cpu_sample: Duration) -> HostSnapshot {
        let mut system = System::new();

        system.refresh_cpu_usage();
        std::thread::sleep(cpu_sample);
        system.refresh_cpu_usage();
        let cpu = system.global_cpu_usage() as f64;

        system.refresh_memory();
        let memory = percent(system.used_memory(), system.total_memory());

        let mounts: Vec<Mount> = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|d| Mount {
                mount_point: d.mount_point().to_path_buf(),
                total: d.total_space(),
                available: d.available_space(),
            })
            .collect();
        let disk = disk_usage(&mounts, disk_path);
        if disk.is_none() {
            warn!(path = %disk_path.display(), "no mounted disk found for path");
        }

        let snapshot = HostSnapshot {
            cpu_percent: cpu.is_finite().then_some(cpu),
            memory_percent: memory,
            disk_percent: disk,
        };
        debug!(?snapshot, "host sampled");
        snapshot
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&self) -> BoxFuture<'_, HostSnapshot> {
        let disk_path = self.disk_path.clone();
        let cpu_sample = self.cpu_sample;
        Box::pin(async move {
            let task =
                tokio::task::spawn_blocking(move || Self::sample_blocking(&disk_path, cpu_sample));
            match task.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "host sampling task failed");
                    HostSnapshot::default()
                }
            }
        })
    }
}

/// A mounted filesystem: mount point, total bytes, available bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    pub mount_point: PathBuf,
    pub total: u64,
    pub available: u64,
}

/// Used-space percentage of the filesystem holding `path`.
///
/// Picks the mount with the longest mount point that is a prefix of
/// `path`.
pub fn disk_usage(mounts: &[Mount], path: &Path) -> Option<f64> {
    let mount = mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.components().count())?;
    percent(mount.total.saturating_sub(mount.available), mount.total)
}

fn percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(used as f64 / total as f64 * 100.0)
}
