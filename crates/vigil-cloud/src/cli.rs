//! Thin async wrapper around the `aws` executable.

use std::ffi::OsString;

use tokio::process::Command;
use tracing::debug;

/// Invokes the AWS CLI for one region with JSON output.
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    region: String,
}

impl AwsCli {
    pub fn new(program: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run `aws <args> --region <r> --output json` and return stdout.
    ///
    /// The child is killed if the returned future is dropped, so callers
    /// can bound it with `tokio::time::timeout`.
    pub async fn run<I, S>(&self, args: I) -> Result<Vec<u8>, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args.into_iter().map(Into::into))
            .arg("--region")
            .arg(&self.region)
            .arg("--output")
            .arg("json")
            .kill_on_drop(true);

        debug!(command = ?cmd.as_std(), "running aws cli");

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to execute {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }

        Ok(output.stdout)
    }
}
