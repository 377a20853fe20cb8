//! Domain events fanned out to subscribers.
//!
//! Serialized events have the shape `{type, ...fields, timestamp}`:
//!
//! ```json
//! {"type":"finger_scanned","user_id":"42","scanned_at":"2024-03-01T08:59:12",
//!  "punch_type":0,"punch_name":"check_in","timestamp":"2024-03-01T11:59:12.481Z"}
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use biobridge_core::{FingerSlot, PunchKind, UserId};
use biobridge_hardware::AttendanceRecord;

/// Prompt sent with `enrollment_started`.
const ENROLL_INSTRUCTIONS: &str = "Place finger on scanner (scan 1 of 3)";

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename = "finger_scanned")]
    ScanDetected {
        user_id: String,
        /// Terminal clock at the moment of the scan.
        scanned_at: NaiveDateTime,
        punch_type: u8,
        punch_name: PunchKind,
    },

    EnrollmentStarted {
        user_id: UserId,
        finger_id: FingerSlot,
        instructions: String,
    },

    #[serde(rename = "enrollment_complete")]
    EnrollmentCompleted {
        user_id: UserId,
        finger_id: FingerSlot,
        success: bool,
    },

    #[serde(rename = "enrollment_error")]
    EnrollmentFailed {
        user_id: UserId,
        finger_id: FingerSlot,
        #[serde(rename = "error")]
        reason: String,
    },

    DeviceDisconnected {
        #[serde(rename = "error")]
        reason: String,
    },

    CaptureError {
        #[serde(rename = "error")]
        reason: String,
    },
}

/// Immutable event stamped at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn scan_detected(record: &AttendanceRecord) -> Self {
        Self::new(EventKind::ScanDetected {
            user_id: record.user_id.clone(),
            scanned_at: record.timestamp,
            punch_type: record.punch,
            punch_name: record.punch_kind(),
        })
    }

    pub fn enrollment_started(user_id: &UserId, finger_id: FingerSlot) -> Self {
        Self::new(EventKind::EnrollmentStarted {
            user_id: user_id.clone(),
            finger_id,
            instructions: ENROLL_INSTRUCTIONS.to_string(),
        })
    }

    pub fn enrollment_completed(user_id: &UserId, finger_id: FingerSlot) -> Self {
        Self::new(EventKind::EnrollmentCompleted {
            user_id: user_id.clone(),
            finger_id,
            success: true,
        })
    }

    pub fn enrollment_failed(
        user_id: &UserId,
        finger_id: FingerSlot,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::EnrollmentFailed {
            user_id: user_id.clone(),
            finger_id,
            reason: reason.into(),
        })
    }

    pub fn device_disconnected(reason: impl Into<String>) -> Self {
        Self::new(EventKind::DeviceDisconnected {
            reason: reason.into(),
        })
    }

    pub fn capture_error(reason: impl Into<String>) -> Self {
        Self::new(EventKind::CaptureError {
            reason: reason.into(),
        })
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::ScanDetected { .. } => "finger_scanned",
            EventKind::EnrollmentStarted { .. } => "enrollment_started",
            EventKind::EnrollmentCompleted { .. } => "enrollment_complete",
            EventKind::EnrollmentFailed { .. } => "enrollment_error",
            EventKind::DeviceDisconnected { .. } => "device_disconnected",
            EventKind::CaptureError { .. } => "capture_error",
        }
    }

    /// Serialize to the JSON text sent to subscribers.
    ///
    /// # Errors
    /// Returns `Error::Serialization` if the event cannot be encoded.
    pub fn to_json(&self) -> biobridge_core::Result<String> {
        serde_json::to_string(self).map_err(|e| biobridge_core::Error::Serialization(e.to_string()))
    }
}
