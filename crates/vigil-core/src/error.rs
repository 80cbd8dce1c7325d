//! Error taxonomy for a health-check run.

use thiserror::Error;

/// Result type alias for vigil operations.
pub type VigilResult<T> = Result<T, VigilError>;

/// Errors that can occur while running a health check.
///
/// `Discovery`, `Configuration` and `BackendQuery` abort the run.
/// `ServiceProbe` is recovered by the caller and recorded as a
/// not-running service.
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("target discovery failed: {0}")]
    Discovery(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("metric query failed: {0}")]
    BackendQuery(String),

    #[error("service probe failed for {service}: {reason}")]
    ServiceProbe { service: String, reason: String },
}

impl VigilError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VigilError::ServiceProbe { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_probe_errors_are_recoverable() {
        let err = VigilError::ServiceProbe {
            service: "sshd".to_string(),
            reason: "spawn failed".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "service probe failed for sshd: spawn failed");
    }

    #[test]
    fn discovery_errors_are_fatal() {
        assert!(VigilError::Discovery("boom".to_string()).is_fatal());
        assert!(VigilError::Configuration("x".to_string()).is_fatal());
        assert!(VigilError::BackendQuery("x".to_string()).is_fatal());
    }
}
