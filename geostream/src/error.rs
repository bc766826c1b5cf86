//! Error types for sensor requests.
//!
//! Filtering rejections (accuracy mismatch, distance below the minimum,
//! heading change below the filter) are not errors. They are normal,
//! high-frequency events and are discarded silently so consumers can
//! distinguish "no update yet" from "failure". Only timeouts and provider
//! errors travel through the error observer channel.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced to request error observers or returned at construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// A required sensor capability is missing on this device.
    ///
    /// Reported once at construction time (e.g. a heading request on a
    /// device without a compass), never on a per-dispatch basis.
    #[error("sensor capability unavailable: {0}")]
    ServiceUnavailable(String),

    /// No sample arrived within the configured timeout interval.
    #[error("no sample received within {0:?}")]
    Timeout(Duration),

    /// Opaque error forwarded verbatim from the sample provider.
    #[error("provider error: {0}")]
    Provider(String),
}

impl SensorError {
    /// Creates a provider error from any error type.
    pub fn provider(err: impl std::fmt::Display) -> Self {
        Self::Provider(err.to_string())
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_interval() {
        let err = SensorError::Timeout(Duration::from_secs(2));
        assert!(err.to_string().contains("2s"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_provider_error_preserves_message() {
        let err = SensorError::provider("gps glitch");
        assert_eq!(err, SensorError::Provider("gps glitch".to_string()));
        assert!(err.to_string().contains("gps glitch"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_service_unavailable_display() {
        let err = SensorError::ServiceUnavailable("heading".to_string());
        assert!(err.to_string().contains("heading"));
    }
}
