//! Defaults and protocol constants for the biometric bridge.
//!
//! Durations are expressed in milliseconds as `u64`, matching the shape of
//! the JSON configuration document. Convert with
//! [`Duration::from_millis`](std::time::Duration::from_millis) at the point
//! of use.
//!
//! ```
//! use biobridge_core::constants::*;
//! use std::time::Duration;
//!
//! let backoff = Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS);
//! assert_eq!(backoff.as_secs(), 5);
//! ```

// ============================================================================
// Biometric Device
// ============================================================================

/// Factory address of the fingerprint terminal.
pub const DEFAULT_DEVICE_ADDRESS: &str = "192.168.1.201";

/// TCP port of the terminal's vendor protocol.
pub const DEFAULT_DEVICE_PORT: u16 = 4370;

/// Transport timeout for ordinary commands (milliseconds).
///
/// # Value: 5000ms (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Transport timeout while an enrollment is in progress (milliseconds).
///
/// Enrollment blocks until a person has scanned the same finger three
/// times on the terminal, so this must cover human reaction time.
///
/// # Value: 60000ms (60 seconds)
pub const DEFAULT_ENROLL_TIMEOUT_MS: u64 = 60_000;

/// Maximum length of a device user id (the terminal's PIN field width).
pub const MAX_USER_ID_LENGTH: usize = 9;

/// Lowest finger slot accepted by enrollment.
pub const MIN_FINGER_SLOT: u8 = 1;

/// Highest finger slot accepted by enrollment.
pub const MAX_FINGER_SLOT: u8 = 10;

/// Finger slot used when a request does not name one.
pub const DEFAULT_FINGER_SLOT: u8 = 1;

// ============================================================================
// Capture Loop
// ============================================================================

/// Internal read timeout of one live-stream poll (milliseconds).
///
/// Bounds how long a stop request can go unobserved by the worker.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Pause after each delivered scan record (milliseconds).
pub const DEFAULT_RECORD_DELAY_MS: u64 = 100;

/// How long a stop request waits for the worker to exit (milliseconds).
pub const DEFAULT_STOP_WAIT_MS: u64 = 500;

// ============================================================================
// Session
// ============================================================================

/// Wait before the single automatic reconnection attempt (milliseconds).
pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 5000;

/// Pause between close and connect on a manual reconnect (milliseconds).
pub const DEFAULT_MANUAL_RECONNECT_DELAY_MS: u64 = 2000;

/// Settle time after opening the dedicated enrollment connection
/// (milliseconds).
pub const DEFAULT_ENROLL_SETTLE_MS: u64 = 1000;

/// Longest an operation waits for the session before it is rejected
/// (milliseconds).
pub const DEFAULT_OPERATION_WAIT_MS: u64 = 90_000;

/// Queue depth of each event subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

// ============================================================================
// Door Lock
// ============================================================================

/// Single-byte command that releases the lock.
pub const LOCK_OPEN_COMMAND: u8 = b'o';

/// Single-byte command that engages the lock.
pub const LOCK_CLOSE_COMMAND: u8 = b'c';

/// Serial port of the lock controller.
pub const DEFAULT_LOCK_PORT: &str = "COM7";

/// Baud rate of the lock controller.
pub const DEFAULT_LOCK_BAUD_RATE: u32 = 9600;

/// Serial write timeout (milliseconds).
pub const DEFAULT_LOCK_SERIAL_TIMEOUT_MS: u64 = 1000;

/// How long the lock stays released before closing on its own (seconds).
pub const DEFAULT_LOCK_OPEN_SECS: u64 = 5;
