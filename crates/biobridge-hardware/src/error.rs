//! Transport and lock errors.
//!
//! Covers the failure modes of the fingerprint terminal transport and the
//! serial lock controller. Network-class failures are distinguished from
//! device-side rejections so the session layer can decide between
//! reconnecting and reporting.

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Failure of a terminal or lock command.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The link dropped while talking to `device`.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    #[error("Device not connected")]
    NotConnected,

    /// No answer within the transport timeout.
    #[error("No reply within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Socket or serial line failure.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// The terminal is serving its live stream.
    #[error("Device busy: {operation}")]
    DeviceBusy { operation: String },

    /// The terminal answered with a failure code.
    #[error("Device rejected command: {message}")]
    Rejected { message: String },

    /// A record or reply could not be decoded.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn busy(operation: impl Into<String>) -> Self {
        Self::DeviceBusy {
            operation: operation.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the link to the device is gone.
    ///
    /// These are the failures a reconnect can fix.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            HardwareError::Disconnected { .. }
                | HardwareError::NotConnected
                | HardwareError::Timeout { .. }
                | HardwareError::CommunicationError { .. }
                | HardwareError::Io(_)
        )
    }

    /// Whether a single record could not be decoded.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, HardwareError::InvalidData { .. })
    }
}

impl From<HardwareError> for biobridge_core::Error {
    fn from(error: HardwareError) -> Self {
        use biobridge_core::Error;

        match error {
            e if e.is_network() => Error::Connection(e.to_string()),
            HardwareError::InvalidData { message } => Error::Serialization(message),
            HardwareError::ConfigurationError { message } => Error::Config(message),
            e => Error::Protocol(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biobridge_core::ErrorKind;

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("192.168.1.201:4370");
        assert!(matches!(error, HardwareError::Disconnected { .. }));
        assert_eq!(error.to_string(), "Device disconnected: 192.168.1.201:4370");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(3000);
        assert_eq!(error.to_string(), "No reply within 3000ms");
    }

    #[test]
    fn test_busy_error() {
        let error = HardwareError::busy("get_users");
        assert_eq!(error.to_string(), "Device busy: get_users");
    }

    #[test]
    fn test_network_classification() {
        assert!(HardwareError::disconnected("x").is_network());
        assert!(HardwareError::NotConnected.is_network());
        assert!(HardwareError::timeout(10).is_network());
        assert!(HardwareError::communication("reset by peer").is_network());
        assert!(!HardwareError::busy("x").is_network());
        assert!(!HardwareError::rejected("x").is_network());
        assert!(!HardwareError::invalid_data("x").is_network());
        assert!(HardwareError::invalid_data("x").is_malformed());
    }

    #[test]
    fn test_conversion_into_core_error() {
        let core: biobridge_core::Error = HardwareError::communication("reset").into();
        assert_eq!(core.kind(), ErrorKind::Connection);

        let core: biobridge_core::Error = HardwareError::invalid_data("short packet").into();
        assert_eq!(core.kind(), ErrorKind::Serialization);
        assert_eq!(core.to_string(), "Malformed device record: short packet");

        let core: biobridge_core::Error = HardwareError::busy("enroll").into();
        assert_eq!(core.kind(), ErrorKind::Protocol);

        let core: biobridge_core::Error = HardwareError::rejected("no such user").into();
        assert_eq!(core.kind(), ErrorKind::Protocol);
    }
}
