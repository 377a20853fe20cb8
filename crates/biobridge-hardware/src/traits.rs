//! Device trait definitions.
//!
//! [`DeviceTransport`] is a thin blocking client over the terminal's vendor
//! protocol. Calls may block for the transport's configured timeout, and
//! [`DeviceTransport::enroll_user`] for as long as a person takes to scan a
//! finger three times. Callers on an async runtime must drive it from a
//! blocking thread.
//!
//! [`LockActuator`] sends the two single-byte lock commands.

use std::time::Duration;

use biobridge_core::{FingerSlot, UserId};

use crate::Result;
use crate::types::{AttendanceRecord, DeviceInfo, DeviceUser};

/// Blocking client for one fingerprint terminal.
///
/// The trait is object safe so a session can own a
/// `Box<dyn DeviceTransport>` regardless of the concrete driver.
///
/// # Live stream
///
/// While a live stream is open the terminal only answers stream reads.
/// Implementations should reject other commands with
/// [`HardwareError::DeviceBusy`](crate::HardwareError::DeviceBusy) until
/// [`stop_live_stream`](Self::stop_live_stream) is called.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use biobridge_hardware::{DeviceTransport, Result};
///
/// fn drain_one<T: DeviceTransport>(transport: &mut T) -> Result<()> {
///     transport.connect()?;
///     transport.start_live_stream()?;
///     if let Some(record) = transport.next_record(Duration::from_millis(250))? {
///         println!("{} punched {}", record.user_id, record.punch_kind());
///     }
///     transport.stop_live_stream()?;
///     transport.disconnect()
/// }
/// ```
pub trait DeviceTransport: Send {
    /// Open the link and authenticate with the terminal.
    ///
    /// # Errors
    /// Network-class errors when the terminal is unreachable.
    fn connect(&mut self) -> Result<()>;

    /// Close the link. Safe to call when already closed.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Replace the per-command timeout, for the open link and later connects.
    fn set_timeout(&mut self, timeout: Duration);

    /// Resume normal terminal operation (scanning, keypad).
    fn enable_device(&mut self) -> Result<()>;

    /// Suspend terminal operation while data is changed.
    fn disable_device(&mut self) -> Result<()>;

    /// Query firmware, serial number and counters.
    fn device_info(&mut self) -> Result<DeviceInfo>;

    fn get_users(&mut self) -> Result<Vec<DeviceUser>>;

    fn get_attendance(&mut self) -> Result<Vec<AttendanceRecord>>;

    fn clear_attendance(&mut self) -> Result<()>;

    /// Remove a user and all of its templates.
    ///
    /// # Errors
    /// [`HardwareError::Rejected`](crate::HardwareError::Rejected) when the
    /// user does not exist.
    fn delete_user(&mut self, user_id: &UserId) -> Result<()>;

    /// Run the terminal's guided enrollment for one finger.
    ///
    /// Blocks until the finger was scanned three times or the transport
    /// timeout expires.
    fn enroll_user(&mut self, user_id: &UserId, finger: FingerSlot) -> Result<()>;

    /// Play the terminal's confirmation voice prompt.
    fn play_chime(&mut self) -> Result<()>;

    /// Register for real-time attendance events.
    fn start_live_stream(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next live record.
    ///
    /// Returns `Ok(None)` when the timeout expires without a scan.
    ///
    /// # Errors
    /// [`HardwareError::InvalidData`](crate::HardwareError::InvalidData)
    /// for a record that could not be decoded; the stream stays usable.
    /// Network-class errors when the link dropped.
    fn next_record(&mut self, timeout: Duration) -> Result<Option<AttendanceRecord>>;

    /// Leave live mode so regular commands are accepted again.
    fn stop_live_stream(&mut self) -> Result<()>;
}

/// Output side of an electric lock controller.
pub trait LockActuator: Send {
    /// Send the release command.
    fn send_open(&mut self) -> Result<()>;

    /// Send the engage command.
    fn send_close(&mut self) -> Result<()>;

    /// Port name, for logging and status.
    fn port_name(&self) -> &str;
}
