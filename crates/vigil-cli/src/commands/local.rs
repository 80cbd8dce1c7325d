use std::sync::Arc;

use tracing::{error, info, warn};

use vigil_core::config::LocalSettings;
use vigil_core::{HealthReport, Overall, ServiceStatus, VerdictStatus, VigilConfig};
use vigil_host::{CommandProbe, LocalCheck, LocalHostDirectory, SysinfoSampler};

pub async fn run(config: &VigilConfig, settings: &LocalSettings) -> anyhow::Result<HealthReport> {
    let directory = LocalHostDirectory::detect();
    let sampler = SysinfoSampler::new(settings.disk_path.clone(), settings.cpu_sample);
    let probe = Arc::new(CommandProbe::new(&settings.probe_command)?);

    info!(
        host = %directory.host().id,
        services = config.services.len(),
        "starting local health check"
    );

    let check = LocalCheck::new(
        &directory,
        &sampler,
        probe,
        &config.thresholds,
        config.services.clone(),
        settings.probe_timeout,
        config.policy,
    );
    let report = check.run().await?;
    log_report(&report);
    Ok(report)
}

/// One log line per observation, so the log file keeps a history of
/// every run.
fn log_report(report: &HealthReport) {
    for verdict in report.verdicts() {
        let value = verdict.display_value();
        if verdict.status == VerdictStatus::Alert {
            warn!(metric = %verdict.metric_label, %value, "usage exceeds threshold");
        } else {
            info!(
                metric = %verdict.metric_label,
                %value,
                status = verdict.status.label(),
                "usage sampled"
            );
        }
    }
    for service in &report.services {
        if service.status == ServiceStatus::NotRunning {
            warn!(service = %service.service, "service not running");
        }
    }
    match report.overall {
        Overall::Healthy => info!("system health check passed"),
        Overall::Attention => error!("system health check failed"),
    }
}
