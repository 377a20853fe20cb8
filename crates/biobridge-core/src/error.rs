use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Device errors
    #[error("Device connection failed: {0}")]
    Connection(String),

    #[error("Device protocol error: {0}")]
    Protocol(String),

    #[error("Malformed device record: {0}")]
    Serialization(String),

    // Session errors
    #[error("Operation {operation} rejected: another operation is still in flight")]
    ConcurrencyViolation { operation: String },

    #[error("Cannot {operation} while session is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid finger slot {0}, expected 1-10")]
    InvalidFingerSlot(u8),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], suitable for wire responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Protocol,
    ConcurrencyViolation,
    Serialization,
    State,
    Validation,
    Config,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) | Error::Io(_) => ErrorKind::Connection,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::ConcurrencyViolation { .. } => ErrorKind::ConcurrencyViolation,
            Error::InvalidState { .. } | Error::InvalidStateTransition { .. } => ErrorKind::State,
            Error::InvalidUserId(_) | Error::InvalidFingerSlot(_) => ErrorKind::Validation,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the reconnection policy can recover from this error.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    pub fn invalid_state(operation: impl Into<String>, state: impl ToString) -> Self {
        Error::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::Connection("refused".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::ConcurrencyViolation {
                operation: "enroll_user".into()
            }
            .kind(),
            ErrorKind::ConcurrencyViolation
        );
        assert_eq!(Error::InvalidFingerSlot(11).kind(), ErrorKind::Validation);
        assert!(Error::Connection("x".into()).is_connection());
        assert!(!Error::Protocol("x".into()).is_connection());
    }

    #[test]
    fn test_error_display() {
        let error = Error::invalid_state("start capture", "Disconnected");
        assert_eq!(
            error.to_string(),
            "Cannot start capture while session is Disconnected"
        );
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConcurrencyViolation).unwrap();
        assert_eq!(json, "\"concurrency_violation\"");
    }
}
