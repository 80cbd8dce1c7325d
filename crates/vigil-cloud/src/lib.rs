//! vigil-cloud: AWS adapters for the cloud health-check path.
//!
//! Implements the engine's collaborator traits on top of the AWS CLI:
//!
//! - [`Ec2Directory`] runs `aws ec2 describe-instances` and turns every
//!   reservation's instances into targets.
//! - [`CloudWatchBackend`] runs `aws cloudwatch get-metric-data` once per
//!   chunk, feeding the request through `--cli-input-json`.
//!
//! Credentials and profiles are whatever the CLI itself resolves. Both
//! adapters also have file-backed replay counterparts
//! ([`load_inventory`], [`ReplayBackend`]) that read previously saved
//! CLI output.

pub mod cli;
pub mod cloudwatch;
pub mod ec2;

pub use cli::AwsCli;
pub use cloudwatch::{CloudWatchBackend, ReplayBackend};
pub use ec2::{Ec2Directory, load_inventory};
