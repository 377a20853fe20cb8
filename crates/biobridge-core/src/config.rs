//! Bridge configuration document.
//!
//! The bridge reads a JSON file shaped like:
//!
//! ```json
//! {
//!   "hardware": {
//!     "fingerprint": { "ip": "192.168.1.201", "port": 4370, "timeout": 5 },
//!     "doorlock": { "port": "COM7", "baudrate": 9600 }
//!   },
//!   "session": { "reconnect_backoff_ms": 5000 }
//! }
//! ```
//!
//! Every field is optional and falls back to the values in
//! [`constants`](crate::constants).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub hardware: HardwareConfig,
    pub session: SessionTuning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub fingerprint: FingerprintConfig,
    pub doorlock: DoorLockConfig,
}

/// Fingerprint terminal endpoint. Timeouts are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub ip: String,
    pub port: u16,
    pub timeout: u64,
    pub enroll_timeout: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_DEVICE_ADDRESS.to_string(),
            port: DEFAULT_DEVICE_PORT,
            timeout: DEFAULT_CONNECT_TIMEOUT_MS / 1000,
            enroll_timeout: DEFAULT_ENROLL_TIMEOUT_MS / 1000,
        }
    }
}

/// Serial lock controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorLockConfig {
    pub port: String,
    pub baudrate: u32,
    pub open_seconds: u64,
}

impl Default for DoorLockConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_LOCK_PORT.to_string(),
            baudrate: DEFAULT_LOCK_BAUD_RATE,
            open_seconds: DEFAULT_LOCK_OPEN_SECS,
        }
    }
}

/// Capture and coordination timings, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    pub poll_interval_ms: u64,
    pub record_delay_ms: u64,
    pub stop_wait_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub manual_reconnect_delay_ms: u64,
    pub enroll_settle_ms: u64,
    pub operation_wait_ms: u64,
    pub subscriber_capacity: usize,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            record_delay_ms: DEFAULT_RECORD_DELAY_MS,
            stop_wait_ms: DEFAULT_STOP_WAIT_MS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            manual_reconnect_delay_ms: DEFAULT_MANUAL_RECONNECT_DELAY_MS,
            enroll_settle_ms: DEFAULT_ENROLL_SETTLE_MS,
            operation_wait_ms: DEFAULT_OPERATION_WAIT_MS,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    /// Returns `Error::Config` if the JSON is malformed or fails
    /// [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid configuration document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read and `Error::Config`
    /// if its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let fingerprint = &self.hardware.fingerprint;
        if fingerprint.ip.trim().is_empty() {
            return Err(Error::Config("hardware.fingerprint.ip is empty".into()));
        }
        if fingerprint.port == 0 {
            return Err(Error::Config("hardware.fingerprint.port must be non-zero".into()));
        }
        if fingerprint.timeout == 0 {
            return Err(Error::Config("hardware.fingerprint.timeout must be non-zero".into()));
        }
        if fingerprint.enroll_timeout < fingerprint.timeout {
            return Err(Error::Config(
                "hardware.fingerprint.enroll_timeout must not be shorter than timeout".into(),
            ));
        }

        let doorlock = &self.hardware.doorlock;
        if doorlock.port.trim().is_empty() {
            return Err(Error::Config("hardware.doorlock.port is empty".into()));
        }
        if doorlock.baudrate == 0 {
            return Err(Error::Config("hardware.doorlock.baudrate must be non-zero".into()));
        }

        let session = &self.session;
        if session.poll_interval_ms == 0 {
            return Err(Error::Config("session.poll_interval_ms must be non-zero".into()));
        }
        if session.subscriber_capacity == 0 {
            return Err(Error::Config("session.subscriber_capacity must be non-zero".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.hardware.fingerprint.ip, "192.168.1.201");
        assert_eq!(config.hardware.fingerprint.port, 4370);
        assert_eq!(config.hardware.fingerprint.timeout, 5);
        assert_eq!(config.hardware.fingerprint.enroll_timeout, 60);
        assert_eq!(config.hardware.doorlock.port, "COM7");
        assert_eq!(config.hardware.doorlock.baudrate, 9600);
        assert_eq!(config.session.reconnect_backoff_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let json = r#"{
            "hardware": {
                "fingerprint": { "ip": "10.0.0.9", "port": 4371 },
                "doorlock": { "port": "/dev/ttyUSB0" }
            }
        }"#;

        let config = BridgeConfig::from_json_str(json).unwrap();
        assert_eq!(config.hardware.fingerprint.ip, "10.0.0.9");
        assert_eq!(config.hardware.fingerprint.port, 4371);
        assert_eq!(config.hardware.fingerprint.timeout, 5);
        assert_eq!(config.hardware.doorlock.port, "/dev/ttyUSB0");
        assert_eq!(config.hardware.doorlock.baudrate, 9600);
        assert_eq!(config.session, SessionTuning::default());
    }

    #[test]
    fn test_empty_document() {
        let config = BridgeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_malformed_document() {
        let result = BridgeConfig::from_json_str("{ hardware: ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let json = r#"{ "hardware": { "fingerprint": { "port": 0 } } }"#;
        let err = BridgeConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("hardware.fingerprint.port"));
    }

    #[test]
    fn test_validation_rejects_short_enroll_timeout() {
        let json = r#"{ "hardware": { "fingerprint": { "timeout": 10, "enroll_timeout": 5 } } }"#;
        let err = BridgeConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("enroll_timeout"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BridgeConfig::load("/nonexistent/biobridge/config.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
