//! JSON command envelope for the boundary layer.
//!
//! A client sends `{"action": ..., "payload": {...}, "request_id": ...}`
//! and receives one [`CommandResponse`]:
//!
//! ```
//! use biobridge_session::Command;
//!
//! let command = Command::from_json(
//!     r#"{"action":"enroll_fingerprint","payload":{"user_id":42,"finger_id":2},"request_id":"r-1"}"#,
//! )
//! .unwrap();
//! assert_eq!(command.action, "enroll_fingerprint");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use biobridge_core::{Error, FingerSlot, Result, UserId};

use crate::result::{OperationError, OperationResult};
use crate::session::DeviceSession;

/// Raw command as received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl Command {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Parse a command from JSON text.
    ///
    /// # Errors
    /// Returns `Error::Serialization` for text that is not a command object.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Reply to one [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub request_id: Option<String>,
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

/// Typed action decoded from a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    EnrollFingerprint { user_id: UserId, finger_id: FingerSlot },
    GetUsers,
    GetAttendance,
    ClearAttendance,
    DeleteUser { user_id: UserId },
    SyncUser { user_id: UserId },
    ReconnectDevice,
    StartCapture,
    StopCapture,
    Status,
    DeviceInfo,
}

/// Clients send user ids as numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct UserPayload {
    user_id: RawUserId,
}

#[derive(Deserialize)]
struct EnrollPayload {
    user_id: RawUserId,
    #[serde(default)]
    finger_id: FingerSlot,
}

impl RawUserId {
    fn into_user_id(self) -> Result<UserId> {
        match self {
            RawUserId::Number(n) => UserId::new(n.to_string()),
            RawUserId::Text(s) => UserId::new(s),
        }
    }
}

fn decode_payload<T: for<'de> Deserialize<'de>>(action: &str, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .map_err(|e| Error::Serialization(format!("invalid payload for {action}: {e}")))
}

impl CommandAction {
    /// Decode `action` and its payload.
    ///
    /// # Errors
    /// `Error::Protocol` for an unknown action, `Error::Serialization` for
    /// a payload of the wrong shape, validation errors for bad ids.
    pub fn parse(action: &str, body: &Value) -> Result<Self> {
        let parsed = match action {
            "enroll_fingerprint" => {
                let p: EnrollPayload = decode_payload(action, body)?;
                CommandAction::EnrollFingerprint {
                    user_id: p.user_id.into_user_id()?,
                    finger_id: p.finger_id,
                }
            }
            "get_users" => CommandAction::GetUsers,
            "get_attendance" => CommandAction::GetAttendance,
            "clear_attendance" => CommandAction::ClearAttendance,
            "delete_user" => {
                let p: UserPayload = decode_payload(action, body)?;
                CommandAction::DeleteUser {
                    user_id: p.user_id.into_user_id()?,
                }
            }
            "sync_user" => {
                let p: UserPayload = decode_payload(action, body)?;
                CommandAction::SyncUser {
                    user_id: p.user_id.into_user_id()?,
                }
            }
            "reconnect_device" => CommandAction::ReconnectDevice,
            "start_capture" => CommandAction::StartCapture,
            "stop_capture" => CommandAction::StopCapture,
            "status" => CommandAction::Status,
            "device_info" => CommandAction::DeviceInfo,
            other => return Err(Error::Protocol(format!("Unknown command: {other}"))),
        };
        Ok(parsed)
    }
}

fn to_json<T: Serialize>(result: OperationResult<T>) -> OperationResult<Value> {
    let OperationResult {
        success,
        data,
        error,
    } = result;
    match data.map(serde_json::to_value).transpose() {
        Ok(data) => OperationResult {
            success,
            data,
            error,
        },
        Err(e) => OperationResult::failed(Error::Serialization(e.to_string())),
    }
}

/// Execute `command` against `session`.
///
/// Never fails: decoding problems are reported in the response like any
/// other operation error.
pub async fn dispatch(session: &DeviceSession, command: Command) -> CommandResponse {
    let Command {
        action,
        payload,
        request_id,
    } = command;
    debug!(action = %action, request_id = ?request_id, "Dispatching command");

    let result = match CommandAction::parse(&action, &payload) {
        Ok(parsed) => execute(session, parsed).await,
        Err(e) => {
            warn!(action = %action, "Rejected command: {}", e);
            OperationResult::failed(e)
        }
    };

    CommandResponse {
        kind: "command_response",
        request_id,
        action,
        success: result.success,
        data: result.data,
        error: result.error,
    }
}

async fn execute(session: &DeviceSession, action: CommandAction) -> OperationResult<Value> {
    match action {
        CommandAction::EnrollFingerprint { user_id, finger_id } => {
            to_json(session.enroll_user(&user_id, finger_id).await)
        }
        CommandAction::GetUsers => to_json(session.list_users().await),
        CommandAction::GetAttendance => to_json(session.list_attendance().await),
        CommandAction::ClearAttendance => to_json(session.clear_attendance().await),
        CommandAction::DeleteUser { user_id } => to_json(session.delete_user(&user_id).await),
        CommandAction::SyncUser { user_id } => {
            // Templates live on the terminal; nothing to pull yet
            debug!(user_id = %user_id, "sync_user acknowledged");
            OperationResult::ok(serde_json::json!({
                "user_id": user_id,
                "message": "sync not implemented",
            }))
        }
        CommandAction::ReconnectDevice => to_json(session.reconnect().await),
        CommandAction::StartCapture => to_json(session.start_capture().await),
        CommandAction::StopCapture => to_json(session.stop_capture().await),
        CommandAction::Status => to_json(OperationResult::ok(session.status())),
        CommandAction::DeviceInfo => to_json(session.device_info().await),
    }
}
