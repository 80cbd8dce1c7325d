//! The local host as a target directory.

use sysinfo::System;

use vigil_core::{Target, VigilResult};
use vigil_engine::{BoxFuture, TargetDirectory};

/// Always yields exactly one running target: this machine.
#[derive(Debug, Clone)]
pub struct LocalHostDirectory {
    name: String,
}

impl LocalHostDirectory {
    /// Named after the OS host name, or "localhost" when unknown.
    pub fn detect() -> Self {
        Self::with_name(System::host_name().unwrap_or_else(|| "localhost".to_string()))
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn host(&self) -> Target {
        Target::local_host(self.name.clone())
    }
}

impl TargetDirectory for LocalHostDirectory {
    fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>> {
        let host = self.host();
        Box::pin(async move { Ok(vec![host]) })
    }
}
