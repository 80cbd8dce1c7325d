//! vigil: threshold health checks for an EC2 fleet or the local machine.
//!
//! # Usage
//!
//! ```text
//! vigil --config config.toml cloud --region eu-west-1
//! vigil --config config.toml local
//! ```
//!
//! Exit code 0 means healthy, 1 means something needs attention and 2
//! means the check itself could not run.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use vigil_core::{Overall, VigilConfig};

mod commands;
mod report;

#[derive(Parser)]
#[command(
    name = "vigil",
    about = "Threshold health checks for EC2 fleets and local hosts",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Report format on stdout.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every EC2 instance in a region against CloudWatch metrics.
    Cloud {
        /// Override [cloud].region.
        #[arg(long)]
        region: Option<String>,
        /// Read a saved `aws ec2 describe-instances` JSON document
        /// instead of calling the AWS CLI.
        #[arg(long)]
        inventory: Option<PathBuf>,
        /// Read a saved `aws cloudwatch get-metric-data` JSON document
        /// instead of calling the AWS CLI.
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Check this machine's CPU, memory, disk and configured services.
    Local {
        /// Override [local].log_file.
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = run(cli).await;
    if let Err(e) = &outcome {
        eprintln!("error: {e:#}");
    }
    ExitCode::from(exit_code(&outcome))
}

/// 0 healthy, 1 needs attention, 2 the check could not run.
fn exit_code(outcome: &anyhow::Result<Overall>) -> u8 {
    match outcome {
        Ok(Overall::Healthy) => 0,
        Ok(Overall::Attention) => 1,
        Err(_) => 2,
    }
}

async fn run(cli: Cli) -> anyhow::Result<Overall> {
    let config = VigilConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Cloud {
            region,
            inventory,
            metrics,
        } => {
            init_tracing(None)?;
            let args = commands::cloud::CloudArgs {
                region,
                inventory,
                metrics,
            };
            let report = commands::cloud::run(&config, args).await?;
            report::emit(&report, cli.format, report::CheckKind::Cloud)?;
            Ok(report.overall)
        }
        Command::Local { log_file } => {
            let settings = config.local_settings()?;
            let log_file = log_file.unwrap_or_else(|| settings.log_file.clone());
            init_tracing(Some(&log_file))?;
            let report = commands::local::run(&config, &settings).await?;
            report::emit(&report, cli.format, report::CheckKind::Local)?;
            Ok(report.overall)
        }
    }
}

/// Stderr logging filtered by `RUST_LOG`, plus an append-only log file
/// when `log_file` is given.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,vigil=info")),
        );

    let file = match log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(open_log(path)?))
                .with_filter(EnvFilter::new("info")),
        ),
        None => None,
    };

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(())
}

fn open_log(path: &Path) -> anyhow::Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}
