//! vigil-host: health checks for the machine vigil runs on.
//!
//! # Architecture
//!
//! ```text
//! LocalCheck::run()
//!   ├── LocalHostDirectory → one synthetic running target
//!   ├── spawn_probes() → one tokio task per configured service
//!   ├── HostSampler::sample() → CPU / memory / disk percentages
//!   ├── evaluate() per metric
//!   ├── PendingProbes::collect() → verdicts in configured order
//!   └── aggregate_local() → HealthReport
//! ```
//!
//! A probe that cannot run, panics or times out is recorded as
//! `NOT RUNNING`; it never aborts the run.

pub mod check;
pub mod directory;
pub mod probe;
pub mod sampler;

pub use check::LocalCheck;
pub use directory::LocalHostDirectory;
pub use probe::{CommandProbe, PendingProbes, ServiceProbe, spawn_probes};
pub use sampler::{HostSampler, HostSnapshot, SysinfoSampler};
