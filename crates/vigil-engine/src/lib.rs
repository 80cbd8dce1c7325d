//! vigil-engine: metric aggregation and threshold evaluation.
//!
//! Turns a set of discovered targets into a [`HealthReport`] in one
//! linear pass per run. The engine owns no I/O: target discovery and
//! metric queries go through the [`TargetDirectory`] and
//! [`MetricsBackend`] traits so the cloud adapters, the local host and
//! tests can all plug in.
//!
//! # Architecture
//!
//! ```text
//! CloudCheck::run()
//!   ├── TargetDirectory::list_targets() → Vec<Target>
//!   ├── build_queries() → QueryPlan (queries + query_id side table)
//!   ├── MetricsBackend::query() per chunk, retried independently
//!   ├── correlate() → latest value per (target, metric)
//!   ├── evaluate() → OK / ALERT / NO_DATA
//!   └── aggregate_fleet() → HealthReport
//! ```
//!
//! [`HealthReport`]: vigil_core::HealthReport

pub mod aggregate;
pub mod backend;
pub mod correlate;
pub mod directory;
pub mod evaluate;
pub mod pipeline;
pub mod query;

pub use aggregate::{aggregate_fleet, aggregate_local, overall_fleet_status};
pub use backend::{BoxFuture, MetricsBackend};
pub use correlate::{CorrelatedMetric, Correlation, correlate};
pub use directory::{StaticDirectory, TargetDirectory};
pub use evaluate::{ThresholdTable, evaluate};
pub use pipeline::CloudCheck;
pub use query::{QueryPlan, QueryPolicy, build_queries, encode_query_id};
