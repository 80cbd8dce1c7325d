//! OS service liveness probes.
//!
//! Each configured service is probed in its own tokio task. Results are
//! collected back in configured order regardless of completion order.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

use vigil_core::{ServiceStatus, ServiceVerdict, VigilError, VigilResult};
use vigil_engine::BoxFuture;

/// Reports whether a named OS service is running.
///
/// An `Err` means the probe itself could not run; callers record that
/// as not running.
pub trait ServiceProbe: Send + Sync {
    fn probe<'a>(&'a self, service: &'a str) -> BoxFuture<'a, VigilResult<ServiceStatus>>;
}

/// Probes by running a command with the service name appended.
///
/// Exit status 0 means running, any other status means not running.
/// With the default `systemctl is-active --quiet` this follows systemd's
/// notion of an active unit.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(command: &[String]) -> VigilResult<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            VigilError::Configuration("probe command must name a program".to_string())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl ServiceProbe for CommandProbe {
    fn probe<'a>(&'a self, service: &'a str) -> BoxFuture<'a, VigilResult<ServiceStatus>> {
        Box::pin(async move {
            let status = Command::new(&self.program)
                .args(&self.args)
                .arg(service)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(|e| VigilError::ServiceProbe {
                    service: service.to_string(),
                    reason: format!("failed to execute {}: {e}", self.program),
                })?;

            debug!(%service, code = ?status.code(), "probe command exited");
            Ok(if status.success() {
                ServiceStatus::Running
            } else {
                ServiceStatus::NotRunning
            })
        })
    }
}

type ProbeOutcome = Result<VigilResult<ServiceStatus>, Elapsed>;

/// Probes that have been dispatched but not yet collected.
pub struct PendingProbes {
    tasks: Vec<(String, JoinHandle<ProbeOutcome>)>,
    timeout: Duration,
}

/// Start one probe task per service, each bounded by `timeout`.
pub fn spawn_probes(
    probe: Arc<dyn ServiceProbe>,
    services: &[String],
    timeout: Duration,
) -> PendingProbes {
    let tasks = services
        .iter()
        .map(|service| {
            let probe = Arc::clone(&probe);
            let name = service.clone();
            let handle = tokio::spawn(async move {
                tokio::time::timeout(timeout, probe.probe(&name)).await
            });
            (service.clone(), handle)
        })
        .collect();
    PendingProbes { tasks, timeout }
}

impl PendingProbes {
    /// Wait for every probe, yielding verdicts in configured order.
    pub async fn collect(self) -> Vec<ServiceVerdict> {
        let mut verdicts = Vec::with_capacity(self.tasks.len());
        for (service, handle) in self.tasks {
            let (status, detail) = match handle.await {
                Ok(Ok(Ok(status))) => (status, None),
                Ok(Ok(Err(e))) => {
                    warn!(%service, error = %e, "service probe failed");
                    (ServiceStatus::NotRunning, Some(e.to_string()))
                }
                Ok(Err(_)) => {
                    warn!(%service, timeout = ?self.timeout, "service probe timed out");
                    (
                        ServiceStatus::NotRunning,
                        Some(format!("probe timed out after {:?}", self.timeout)),
                    )
                }
                Err(e) => {
                    warn!(%service, error = %e, "service probe task failed");
                    (ServiceStatus::NotRunning, Some(format!("probe task failed: {e}")))
                }
            };
            info!(%service, status = status.label(), "service probed");
            verdicts.push(ServiceVerdict {
                service,
                status,
                detail,
            });
        }
        verdicts
    }
}
