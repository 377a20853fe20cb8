//! Hardware abstraction layer for the biometric bridge.
//!
//! This crate defines the blocking client interface of a fingerprint
//! terminal ([`DeviceTransport`]) and the serial lock controller
//! ([`lock::DoorLock`]), together with in-memory stand-ins used by tests
//! and development setups.
//!
//! # Design Philosophy
//!
//! - **Blocking transport**: the terminal's vendor protocol is a
//!   request/response exchange with long blocking calls (enrollment, live
//!   stream reads). The trait keeps that shape and leaves thread placement
//!   to the session layer.
//! - **Object-safe**: `Box<dyn DeviceTransport>` works for any driver.
//! - **Error-aware**: [`HardwareError::is_network`] separates link failures
//!   from device-side rejections.
//!
//! # Biometric Terminal
//!
//! ```no_run
//! use biobridge_core::UserId;
//! use biobridge_hardware::{DeviceTransport, Result};
//!
//! fn remove_user<T: DeviceTransport>(terminal: &mut T, id: &UserId) -> Result<()> {
//!     terminal.disable_device()?;
//!     let deleted = terminal.delete_user(id);
//!     terminal.enable_device()?;
//!     deleted
//! }
//! ```
//!
//! # Mock Implementations
//!
//! [`mock::MockTransport`] simulates the terminal, including the rule that
//! regular commands are refused while the live stream is open.
//! [`mock::MemoryPort`] records lock commands.

pub mod error;
pub mod lock;
pub mod mock;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use lock::{DoorLock, LockStatus, SerialActuator};
pub use traits::{DeviceTransport, LockActuator};
pub use types::{AttendanceRecord, DeviceInfo, DeviceUser};
