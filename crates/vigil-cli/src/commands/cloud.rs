use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use vigil_cloud::{AwsCli, CloudWatchBackend, Ec2Directory, ReplayBackend, load_inventory};
use vigil_core::{HealthReport, VigilConfig};
use vigil_engine::{CloudCheck, MetricsBackend, TargetDirectory};

pub struct CloudArgs {
    pub region: Option<String>,
    pub inventory: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
}

pub async fn run(config: &VigilConfig, args: CloudArgs) -> anyhow::Result<HealthReport> {
    let mut settings = config.cloud_settings()?;
    if let Some(region) = args.region {
        settings.region = region;
    }
    let metrics = config.metric_definitions()?;
    let cli = AwsCli::new(settings.aws_cli.clone(), settings.region.clone());

    let directory: Box<dyn TargetDirectory> = match &args.inventory {
        Some(path) => Box::new(load_inventory(path).context("loading inventory")?),
        None => Box::new(Ec2Directory::new(cli.clone(), settings.instance_ids.clone())),
    };
    let backend: Box<dyn MetricsBackend> = match &args.metrics {
        Some(path) => Box::new(ReplayBackend::from_file(path).context("loading metric replay")?),
        None => Box::new(CloudWatchBackend::new(cli)),
    };

    info!(
        region = %settings.region,
        metrics = metrics.len(),
        replay = args.inventory.is_some() || args.metrics.is_some(),
        "starting cloud health check"
    );

    let check = CloudCheck::new(
        directory.as_ref(),
        backend.as_ref(),
        metrics,
        &settings,
        config.policy,
    );
    Ok(check.run().await?)
}
