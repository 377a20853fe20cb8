//! Records exchanged with the fingerprint terminal.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use biobridge_core::PunchKind;

/// Identity and counters reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "K40", "MockTerminal").
    pub name: String,

    /// Device model identifier.
    pub model: String,

    /// Optional device serial number.
    pub serial_number: Option<String>,

    /// Optional firmware version string.
    pub firmware_version: Option<String>,

    /// Optional platform string (e.g., "ZMM220_TFT").
    pub platform: Option<String>,

    /// Enrolled users, when the terminal reports it.
    pub user_count: Option<u32>,

    /// Stored attendance records, when the terminal reports it.
    pub record_count: Option<u32>,
}

impl DeviceInfo {
    /// Create a new DeviceInfo with required fields.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            serial_number: None,
            firmware_version: None,
            platform: None,
            user_count: None,
            record_count: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the firmware version.
    pub fn with_firmware_version(mut self, firmware_version: impl Into<String>) -> Self {
        self.firmware_version = Some(firmware_version.into());
        self
    }

    /// Set the platform string.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Set user and attendance record counters.
    pub fn with_counts(mut self, users: u32, records: u32) -> Self {
        self.user_count = Some(users);
        self.record_count = Some(records);
        self
    }
}

/// User entry stored on the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUser {
    /// Internal slot number assigned by the terminal.
    pub uid: u16,

    /// Operator-facing user id (PIN field).
    pub user_id: String,

    pub name: String,

    /// 0 for a normal user, 14 for an administrator.
    pub privilege: u8,
}

impl DeviceUser {
    pub fn new(uid: u16, user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid,
            user_id: user_id.into(),
            name: name.into(),
            privilege: 0,
        }
    }
}

/// One attendance record, either stored or delivered live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub user_id: String,

    /// Terminal wall-clock time. Terminals carry no timezone.
    pub timestamp: NaiveDateTime,

    /// Verification method reported by the terminal.
    pub status: u8,

    /// Raw punch code, see [`PunchKind`].
    pub punch: u8,
}

impl AttendanceRecord {
    pub fn new(user_id: impl Into<String>, timestamp: NaiveDateTime, punch: u8) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            status: 1,
            punch,
        }
    }

    #[must_use]
    pub fn punch_kind(&self) -> PunchKind {
        PunchKind::from_code(i32::from(self.punch))
    }
}
