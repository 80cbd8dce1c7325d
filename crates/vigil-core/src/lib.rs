//! vigil-core: shared types for the vigil health checker.
//!
//! Everything a health-check run passes between stages lives here:
//! targets, metric definitions, queries, backend results, verdicts and
//! the final [`HealthReport`]. Configuration is parsed once into a
//! [`VigilConfig`] value and handed to each component explicitly.

pub mod config;
pub mod duration;
pub mod error;
pub mod types;

pub use config::VigilConfig;
pub use error::{VigilError, VigilResult};
pub use types::*;
