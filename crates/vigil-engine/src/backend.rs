//! Seam to the time-series metrics backend.

use std::future::Future;
use std::pin::Pin;

use vigil_core::{MetricQuery, MetricResult, VigilResult};

/// Boxed future alias used by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes one batched metric request.
///
/// Implementations receive at most the configured per-request query
/// count and return one [`MetricResult`] per query id they have data
/// for. Results may arrive in any order; the same query id may appear
/// more than once when the backend paginates.
pub trait MetricsBackend: Send + Sync {
    fn query<'a>(
        &'a self,
        batch: &'a [MetricQuery],
    ) -> BoxFuture<'a, VigilResult<Vec<MetricResult>>>;
}
