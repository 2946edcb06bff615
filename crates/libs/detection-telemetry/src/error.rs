//! Error types for collector delivery
//!
//! Every variant here is a transient delivery failure: the resilient sender
//! absorbs them, reconnects, and never lets them reach the frame callback.

use thiserror::Error;

/// Result type alias for telemetry delivery operations
pub type TelemetryResult<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while talking to the collector
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Opening the collector connection failed
    #[error("Collector connection failed: {0}")]
    Connect(String),

    /// Opening the collector connection took longer than allowed
    #[error("Collector connection timed out after {timeout_ms}ms: {url}")]
    ConnectTimeout {
        /// Configured timeout
        timeout_ms: u64,
        /// Collector endpoint
        url: String,
    },

    /// Writing a message on an open connection failed
    #[error("Collector send failed: {0}")]
    Send(String),

    /// Message could not be encoded to the wire format
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The collector closed the connection
    #[error("Collector connection closed")]
    Closed,
}

impl TelemetryError {
    /// Short label used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryError::Connect(_) => "connect",
            TelemetryError::ConnectTimeout { .. } => "connect_timeout",
            TelemetryError::Send(_) => "send",
            TelemetryError::Serialization(_) => "serialization",
            TelemetryError::Closed => "closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TelemetryError::Connect("connection refused".to_string());
        assert_eq!(
            error.to_string(),
            "Collector connection failed: connection refused"
        );

        let error = TelemetryError::ConnectTimeout {
            timeout_ms: 10_000,
            url: "ws://10.0.0.1:3001/edge".to_string(),
        };
        assert!(error.to_string().contains("10000ms"));
        assert!(error.to_string().contains("ws://10.0.0.1:3001/edge"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: TelemetryError = parse_err.into();
        assert_eq!(error.kind(), "serialization");
    }
}
