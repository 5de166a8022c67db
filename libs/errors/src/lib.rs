//! Unified error handling for the gas-compressor telemetry services
//!
//! Acquisition, simulation and resolution all report failures through
//! [`GcsError`]. Resolution exhaustion and stale rejection are *not* errors:
//! they surface as typed `BAD` results in the resolver.

use thiserror::Error;

// ============================================================================
// GcsError - Main error type
// ============================================================================

/// Main error type for the acquisition and simulation services
#[derive(Debug, Error)]
pub enum GcsError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No register map could be found at any candidate location
    #[error("Register map not found: {0}")]
    ConfigurationAbsent(String),

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Read failed at {start}+{count}: {reason}")]
    ReadFailed {
        start: u16,
        count: u16,
        reason: String,
    },

    /// Device answered with a Modbus exception response
    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}")]
    ModbusException { function: u8, code: u8 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Not connected")]
    NotConnected,

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {file}: {error}")]
    ParseError { file: String, error: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ======================================
    // Catch-all
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GcsError
pub type GcsResult<T> = Result<T, GcsError>;

impl GcsError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection_failed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failed(start: u16, count: u16, reason: impl ToString) -> Self {
        Self::ReadFailed {
            start,
            count,
            reason: reason.to_string(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn timeout(target: impl Into<String>) -> Self {
        Self::Timeout(target.into())
    }

    /// Whether the transport must be treated as down after this error.
    ///
    /// A device exception proves the link is alive, so it does not count.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ReadFailed { .. }
                | Self::Timeout(_)
                | Self::NotConnected
                | Self::Io(_)
                | Self::Protocol(_)
        )
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for GcsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GcsError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_classification() {
        assert!(GcsError::timeout("localhost:5020").is_connection_error());
        assert!(GcsError::NotConnected.is_connection_error());
        assert!(GcsError::read_failed(0, 10, "reset by peer").is_connection_error());

        let exception = GcsError::ModbusException {
            function: 0x03,
            code: 0x02,
        };
        assert!(!exception.is_connection_error());
        assert!(!GcsError::configuration("bad").is_connection_error());
    }

    #[test]
    fn test_display() {
        let err = GcsError::connection_failed("10.0.0.5:502", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection failed: 10.0.0.5:502: connection refused"
        );

        let exception = GcsError::ModbusException {
            function: 0x03,
            code: 0x02,
        };
        assert_eq!(
            exception.to_string(),
            "Modbus exception 0x02 for function 0x03"
        );
    }
}
