//! Target discovery.

use vigil_core::{Target, VigilResult};

use crate::backend::BoxFuture;

/// Enumerates the targets monitored in one run.
///
/// Fails with [`vigil_core::VigilError::Discovery`] when the backing
/// enumeration fails or returns malformed data.
pub trait TargetDirectory: Send + Sync {
    fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>>;
}

/// A directory over a fixed list, e.g. a replayed inventory file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    targets: Vec<Target>,
}

impl StaticDirectory {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

impl TargetDirectory for StaticDirectory {
    fn list_targets(&self) -> BoxFuture<'_, VigilResult<Vec<Target>>> {
        let targets = self.targets.clone();
        Box::pin(async move { Ok(targets) })
    }
}
