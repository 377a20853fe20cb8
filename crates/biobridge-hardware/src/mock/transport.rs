//! Mock fingerprint terminal implementation for testing and development.
//!
//! The terminal half ([`MockTransport`]) is handed to the code under test;
//! the [`MockTransportHandle`] stays with the test to feed live records,
//! script failures and inspect the command log.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use biobridge_core::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use biobridge_core::{FingerSlot, UserId};
use chrono::{Local, NaiveDateTime};
use tracing::trace;

use crate::traits::DeviceTransport;
use crate::types::{AttendanceRecord, DeviceInfo, DeviceUser};
use crate::{HardwareError, Result};

/// Command received by the mock terminal, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Disconnect,
    SetTimeout(Duration),
    EnableDevice,
    DisableDevice,
    DeviceInfo,
    GetUsers,
    GetAttendance,
    ClearAttendance,
    DeleteUser(String),
    EnrollUser { user_id: String, template_index: u8 },
    PlayChime,
    StartLiveStream,
    StopLiveStream,
}

/// Command without arguments, used to script faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Connect,
    Disconnect,
    SetTimeout,
    EnableDevice,
    DisableDevice,
    DeviceInfo,
    GetUsers,
    GetAttendance,
    ClearAttendance,
    DeleteUser,
    EnrollUser,
    PlayChime,
    StartLiveStream,
    StopLiveStream,
}

impl TransportCall {
    pub fn kind(&self) -> CallKind {
        match self {
            TransportCall::Connect => CallKind::Connect,
            TransportCall::Disconnect => CallKind::Disconnect,
            TransportCall::SetTimeout(_) => CallKind::SetTimeout,
            TransportCall::EnableDevice => CallKind::EnableDevice,
            TransportCall::DisableDevice => CallKind::DisableDevice,
            TransportCall::DeviceInfo => CallKind::DeviceInfo,
            TransportCall::GetUsers => CallKind::GetUsers,
            TransportCall::GetAttendance => CallKind::GetAttendance,
            TransportCall::ClearAttendance => CallKind::ClearAttendance,
            TransportCall::DeleteUser(_) => CallKind::DeleteUser,
            TransportCall::EnrollUser { .. } => CallKind::EnrollUser,
            TransportCall::PlayChime => CallKind::PlayChime,
            TransportCall::StartLiveStream => CallKind::StartLiveStream,
            TransportCall::StopLiveStream => CallKind::StopLiveStream,
        }
    }
}

/// Scripted failure. Network faults also drop the mock's link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    Network(String),
    Rejected(String),
    InvalidData(String),
    Other(String),
}

impl MockFault {
    pub fn network(message: impl Into<String>) -> Self {
        MockFault::Network(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        MockFault::Rejected(message.into())
    }

    fn into_error(self) -> HardwareError {
        match self {
            MockFault::Network(message) => HardwareError::communication(message),
            MockFault::Rejected(message) => HardwareError::rejected(message),
            MockFault::InvalidData(message) => HardwareError::invalid_data(message),
            MockFault::Other(message) => HardwareError::other(message),
        }
    }
}

#[derive(Debug)]
enum StreamItem {
    Record(AttendanceRecord),
    Fault(MockFault),
}

#[derive(Debug)]
struct MockState {
    open: bool,
    streaming: bool,
    enabled: bool,
    timeout: Duration,
    enroll_delay: Duration,
    info: DeviceInfo,
    users: BTreeMap<String, DeviceUser>,
    attendance: Vec<AttendanceRecord>,
    calls: Vec<TransportCall>,
    faults: HashMap<CallKind, VecDeque<MockFault>>,
    busy_rejections: usize,
    next_uid: u16,
}

/// Which preconditions a command checks before running.
#[derive(Clone, Copy)]
enum Gate {
    None,
    Open,
    /// Open and not streaming.
    Idle,
}

/// Simulated fingerprint terminal.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use biobridge_hardware::DeviceTransport;
/// use biobridge_hardware::mock::MockTransport;
///
/// let (mut transport, handle) = MockTransport::new();
/// transport.connect().unwrap();
/// transport.start_live_stream().unwrap();
///
/// handle.push_scan("42", 0).unwrap();
/// let record = transport.next_record(Duration::from_millis(100)).unwrap().unwrap();
/// assert_eq!(record.user_id, "42");
///
/// // Regular commands are refused while streaming
/// assert!(transport.get_users().is_err());
/// assert_eq!(handle.busy_rejections(), 1);
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    stream_rx: mpsc::Receiver<StreamItem>,
}

impl MockTransport {
    /// Create a terminal with an empty user table.
    pub fn new() -> (Self, MockTransportHandle) {
        Self::with_info(
            DeviceInfo::new("MockTerminal", "Mock K40")
                .with_firmware_version("Ver 6.60 Mock")
                .with_serial_number("MOCK0001")
                .with_platform("ZMM220_TFT"),
        )
    }

    /// Create a terminal reporting the given identity.
    pub fn with_info(info: DeviceInfo) -> (Self, MockTransportHandle) {
        let (stream_tx, stream_rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(MockState {
            open: false,
            streaming: false,
            enabled: true,
            timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            enroll_delay: Duration::ZERO,
            info,
            users: BTreeMap::new(),
            attendance: Vec::new(),
            calls: Vec::new(),
            faults: HashMap::new(),
            busy_rejections: 0,
            next_uid: 1,
        }));

        let transport = Self {
            state: Arc::clone(&state),
            stream_rx,
        };
        let handle = MockTransportHandle { state, stream_tx };

        (transport, handle)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, apply scripted faults, then check the gate.
    fn enter(&self, call: TransportCall, gate: Gate) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        let kind = call.kind();
        trace!("Mock terminal received {:?}", call);
        state.calls.push(call);

        if let Some(fault) = state.faults.get_mut(&kind).and_then(VecDeque::pop_front) {
            if matches!(fault, MockFault::Network(_)) {
                state.open = false;
                state.streaming = false;
            }
            return Err(fault.into_error());
        }

        match gate {
            Gate::None => {}
            Gate::Open | Gate::Idle if !state.open => return Err(HardwareError::NotConnected),
            Gate::Idle if state.streaming => {
                state.busy_rejections += 1;
                return Err(HardwareError::busy(format!("{kind:?}")));
            }
            Gate::Open | Gate::Idle => {}
        }

        Ok(state)
    }
}

impl DeviceTransport for MockTransport {
    fn connect(&mut self) -> Result<()> {
        let mut state = self.enter(TransportCall::Connect, Gate::None)?;
        state.open = true;
        state.streaming = false;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut state = self.enter(TransportCall::Disconnect, Gate::None)?;
        state.open = false;
        state.streaming = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn set_timeout(&mut self, timeout: Duration) {
        let mut state = self.state();
        state.calls.push(TransportCall::SetTimeout(timeout));
        state.timeout = timeout;
    }

    fn enable_device(&mut self) -> Result<()> {
        self.enter(TransportCall::EnableDevice, Gate::Idle)?.enabled = true;
        Ok(())
    }

    fn disable_device(&mut self) -> Result<()> {
        self.enter(TransportCall::DisableDevice, Gate::Idle)?.enabled = false;
        Ok(())
    }

    fn device_info(&mut self) -> Result<DeviceInfo> {
        let state = self.enter(TransportCall::DeviceInfo, Gate::Idle)?;
        let users = u32::try_from(state.users.len()).unwrap_or(u32::MAX);
        let records = u32::try_from(state.attendance.len()).unwrap_or(u32::MAX);
        Ok(state.info.clone().with_counts(users, records))
    }

    fn get_users(&mut self) -> Result<Vec<DeviceUser>> {
        let state = self.enter(TransportCall::GetUsers, Gate::Idle)?;
        Ok(state.users.values().cloned().collect())
    }

    fn get_attendance(&mut self) -> Result<Vec<AttendanceRecord>> {
        let state = self.enter(TransportCall::GetAttendance, Gate::Idle)?;
        Ok(state.attendance.clone())
    }

    fn clear_attendance(&mut self) -> Result<()> {
        self.enter(TransportCall::ClearAttendance, Gate::Idle)?
            .attendance
            .clear();
        Ok(())
    }

    fn delete_user(&mut self, user_id: &UserId) -> Result<()> {
        let mut state = self.enter(
            TransportCall::DeleteUser(user_id.to_string()),
            Gate::Idle,
        )?;
        state
            .users
            .remove(user_id.as_str())
            .map(|_| ())
            .ok_or_else(|| HardwareError::rejected(format!("user {user_id} not found")))
    }

    fn enroll_user(&mut self, user_id: &UserId, finger: FingerSlot) -> Result<()> {
        let call = TransportCall::EnrollUser {
            user_id: user_id.to_string(),
            template_index: finger.template_index(),
        };
        let delay = self.enter(call, Gate::Idle)?.enroll_delay;

        // Someone is scanning their finger
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state();
        if !state.open {
            return Err(HardwareError::disconnected("link lost during enrollment"));
        }
        let uid = state.next_uid;
        state.next_uid = state.next_uid.wrapping_add(1);
        state.users.insert(
            user_id.to_string(),
            DeviceUser::new(uid, user_id.as_str(), ""),
        );
        Ok(())
    }

    fn play_chime(&mut self) -> Result<()> {
        self.enter(TransportCall::PlayChime, Gate::Open)?;
        Ok(())
    }

    fn start_live_stream(&mut self) -> Result<()> {
        self.enter(TransportCall::StartLiveStream, Gate::Idle)?.streaming = true;
        Ok(())
    }

    fn next_record(&mut self, timeout: Duration) -> Result<Option<AttendanceRecord>> {
        {
            let state = self.state();
            if !state.open {
                return Err(HardwareError::NotConnected);
            }
            if !state.streaming {
                return Err(HardwareError::rejected("live stream not started"));
            }
        }

        match self.stream_rx.recv_timeout(timeout) {
            Ok(StreamItem::Record(record)) => {
                self.state().attendance.push(record.clone());
                Ok(Some(record))
            }
            Ok(StreamItem::Fault(fault)) => {
                if matches!(fault, MockFault::Network(_)) {
                    let mut state = self.state();
                    state.open = false;
                    state.streaming = false;
                }
                Err(fault.into_error())
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // Handle dropped; behave like an idle terminal
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn stop_live_stream(&mut self) -> Result<()> {
        let mut state = self.enter(TransportCall::StopLiveStream, Gate::None)?;
        state.streaming = false;
        if !state.open {
            return Err(HardwareError::NotConnected);
        }
        Ok(())
    }
}

/// Test-side controls of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
    stream_tx: mpsc::Sender<StreamItem>,
}

impl MockTransportHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, item: StreamItem) -> Result<()> {
        self.stream_tx
            .send(item)
            .map_err(|_| HardwareError::disconnected("mock terminal dropped"))
    }

    /// Queue a live record.
    pub fn push_record(&self, record: AttendanceRecord) -> Result<()> {
        self.send(StreamItem::Record(record))
    }

    /// Queue a live record stamped with the current local time.
    pub fn push_scan(&self, user_id: &str, punch: u8) -> Result<()> {
        let now: NaiveDateTime = Local::now().naive_local();
        self.push_record(AttendanceRecord::new(user_id, now, punch))
    }

    /// Queue an undecodable record.
    pub fn push_malformed(&self, message: impl Into<String>) -> Result<()> {
        self.send(StreamItem::Fault(MockFault::InvalidData(message.into())))
    }

    /// Queue a stream failure.
    pub fn push_stream_fault(&self, fault: MockFault) -> Result<()> {
        self.send(StreamItem::Fault(fault))
    }

    /// Make the next call of `kind` fail with `fault`.
    ///
    /// Faults for the same kind are consumed in the order queued.
    pub fn queue_fault(&self, kind: CallKind, fault: MockFault) {
        self.state()
            .faults
            .entry(kind)
            .or_default()
            .push_back(fault);
    }

    /// Seed a user as if it had been enrolled earlier.
    pub fn add_user(&self, user_id: &str, name: &str) {
        let mut state = self.state();
        let uid = state.next_uid;
        state.next_uid = state.next_uid.wrapping_add(1);
        state
            .users
            .insert(user_id.to_string(), DeviceUser::new(uid, user_id, name));
    }

    /// Make enrollment block for `delay` before completing.
    pub fn set_enroll_delay(&self, delay: Duration) {
        self.state().enroll_delay = delay;
    }

    pub fn users(&self) -> Vec<DeviceUser> {
        self.state().users.values().cloned().collect()
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.state().users.contains_key(user_id)
    }

    /// Every command received so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, kind: CallKind) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Commands refused because the live stream was open.
    pub fn busy_rejections(&self) -> usize {
        self.state().busy_rejections
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn is_streaming(&self) -> bool {
        self.state().streaming
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn timeout(&self) -> Duration {
        self.state().timeout
    }

    /// Drop the link as if the cable was pulled.
    pub fn sever(&self) {
        let mut state = self.state();
        state.open = false;
        state.streaming = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> (MockTransport, MockTransportHandle) {
        let (mut transport, handle) = MockTransport::new();
        transport.connect().unwrap();
        (transport, handle)
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn test_commands_require_connection() {
        let (mut transport, _handle) = MockTransport::new();
        assert!(matches!(
            transport.get_users(),
            Err(HardwareError::NotConnected)
        ));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_enroll_and_delete_user() {
        let (mut transport, handle) = connected();

        transport.enroll_user(&uid("42"), FingerSlot::default()).unwrap();
        assert!(handle.has_user("42"));
        assert_eq!(transport.get_users().unwrap().len(), 1);

        transport.delete_user(&uid("42")).unwrap();
        assert!(!handle.has_user("42"));

        let err = transport.delete_user(&uid("42")).unwrap_err();
        assert!(matches!(err, HardwareError::Rejected { .. }));
    }

    #[test]
    fn test_enroll_records_template_index() {
        let (mut transport, handle) = connected();
        transport
            .enroll_user(&uid("7"), FingerSlot::new(3).unwrap())
            .unwrap();

        assert!(handle.calls().contains(&TransportCall::EnrollUser {
            user_id: "7".into(),
            template_index: 2,
        }));
    }

    #[test]
    fn test_busy_while_streaming() {
        let (mut transport, handle) = connected();
        transport.start_live_stream().unwrap();

        let err = transport.disable_device().unwrap_err();
        assert!(matches!(err, HardwareError::DeviceBusy { .. }));
        assert_eq!(handle.busy_rejections(), 1);

        transport.stop_live_stream().unwrap();
        transport.disable_device().unwrap();
        assert_eq!(handle.busy_rejections(), 1);
        assert!(!handle.is_enabled());
    }

    #[test]
    fn test_stream_delivers_in_order_and_times_out() {
        let (mut transport, handle) = connected();
        transport.start_live_stream().unwrap();

        handle.push_scan("1", 0).unwrap();
        handle.push_scan("2", 1).unwrap();

        let poll = Duration::from_millis(50);
        assert_eq!(transport.next_record(poll).unwrap().unwrap().user_id, "1");
        assert_eq!(transport.next_record(poll).unwrap().unwrap().user_id, "2");
        assert!(transport.next_record(poll).unwrap().is_none());
    }

    #[test]
    fn test_stream_network_fault_drops_link() {
        let (mut transport, handle) = connected();
        transport.start_live_stream().unwrap();
        handle
            .push_stream_fault(MockFault::network("connection reset"))
            .unwrap();

        let err = transport.next_record(Duration::from_millis(50)).unwrap_err();
        assert!(err.is_network());
        assert!(!handle.is_open());
        assert!(!handle.is_streaming());
    }

    #[test]
    fn test_malformed_record_keeps_stream() {
        let (mut transport, handle) = connected();
        transport.start_live_stream().unwrap();
        handle.push_malformed("truncated event").unwrap();
        handle.push_scan("5", 2).unwrap();

        let poll = Duration::from_millis(50);
        assert!(transport.next_record(poll).unwrap_err().is_malformed());
        assert_eq!(transport.next_record(poll).unwrap().unwrap().punch, 2);
    }

    #[test]
    fn test_queued_faults_are_consumed_in_order() {
        let (mut transport, handle) = MockTransport::new();
        handle.queue_fault(CallKind::Connect, MockFault::network("unreachable"));

        assert!(transport.connect().unwrap_err().is_network());
        transport.connect().unwrap();
        assert_eq!(handle.call_count(CallKind::Connect), 2);
    }

    #[test]
    fn test_device_info_counts() {
        let (mut transport, handle) = connected();
        handle.add_user("1", "Ana");
        handle.add_user("2", "Bruno");

        let info = transport.device_info().unwrap();
        assert_eq!(info.user_count, Some(2));
        assert_eq!(info.record_count, Some(0));
        assert_eq!(info.serial_number.as_deref(), Some("MOCK0001"));
    }
}
