//! EC2 instance discovery.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use vigil_core::{Target, TargetState, VigilError, VigilResult};
use vigil_engine::{BoxFuture, StaticDirectory, TargetDirectory};

use crate::cli::AwsCli;

/// `describe-instances` output, reduced to the fields we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    state: InstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

/// Parse `aws ec2 describe-instances` JSON into targets.
///
/// Instances are returned in reservation order.
pub fn parse_instances(json: &[u8]) -> VigilResult<Vec<Target>> {
    let output: DescribeInstancesOutput = serde_json::from_slice(json)
        .map_err(|e| VigilError::Discovery(format!("malformed describe-instances output: {e}")))?;

    Ok(output
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(|i| Target::cloud_instance(i.instance_id, TargetState::parse(&i.state.name)))
        .collect())
}

/// Load a saved `describe-instances` document as a fixed directory.
pub fn load_inventory(path: &Path) -> VigilResult<StaticDirectory> {
    let json = std::fs::read(path)
        .map_err(|e| VigilError::Discovery(format!("cannot read {}: {e}", path.display())))?;
    let targets = parse_instances(&json)?;
    info!(path = %path.display(), targets = targets.len(), "inventory loaded");
    Ok(StaticDirectory::new(targets))
}

/// Discovers EC2 instances in one region through the AWS CLI.
#[derive(Debug, Clone)]
pub struct Ec2Directory {
    cli: AwsCli,
    /// Restrict discovery to these ids. Empty means every instance.
    instance_ids: Vec<String>,
}

impl Ec2Directory {
    pub fn new(cli: AwsCli, instance_ids: Vec<String>) -> Self {
        Self { cli, instance_ids }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["ec2".to_string(), "describe-instances".to_string()];
        if !self.instance_ids.is_empty() {
            args.push("--instance-ids".to_string());
            args.extend(self.instance_ids.iter().cloned());
        }
        args
    }
}

impl TargetDirectory for Ec2Directory {
    fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>> {
        Box::pin(async move {
            let stdout = self.cli.run(self.args()).await.map_err(VigilError::Discovery)?;
            let targets = parse_instances(&stdout)?;
            debug!(region = %self.cli.region(), targets = targets.len(), "ec2 instances described");
            Ok(targets)
        })
    }
}
