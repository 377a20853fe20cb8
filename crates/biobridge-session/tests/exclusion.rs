//! Capture and administrative operations never share the transport.

mod common;

use std::time::Duration;

use biobridge_core::{ErrorKind, FingerSlot, UserId};
use biobridge_hardware::mock::{CallKind, MockTransport};
use biobridge_hardware::{AttendanceRecord, DeviceInfo, DeviceTransport, DeviceUser};
use biobridge_session::{DeviceSession, SessionConfig, SessionState};

use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_sequences_never_hit_busy_device() {
    let (session, handle) = connected().await;
    handle.add_user("1", "Ada");

    for round in 0..10 {
        assert!(session.start_capture().await.is_success());
        handle.push_scan("1", 0).unwrap();

        assert!(session.list_users().await.is_success());
        assert_eq!(session.state(), SessionState::Capturing);

        if round % 2 == 0 {
            assert!(session.stop_capture().await.is_success());
            // Immediately after a stop the device must accept commands
            assert!(session.list_attendance().await.is_success());
            assert_eq!(session.state(), SessionState::Ready);
        } else {
            assert!(session.device_info().await.is_success());
            assert!(session.stop_capture().await.is_success());
        }
    }

    assert_eq!(handle.busy_rejections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operations_are_serialized() {
    let (session, handle) = capturing().await;

    let mut tasks = Vec::new();
    for n in 0..6 {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            if n % 2 == 0 {
                session.list_users().await.is_success()
            } else {
                session.list_attendance().await.is_success()
            }
        }));
    }
    let stopper = {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.stop_capture().await.is_success()
        })
    };

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert!(stopper.await.unwrap());

    assert_eq!(handle.busy_rejections(), 0);
    assert!(!handle.is_streaming());
    assert!(session.state().is_resting());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scans_between_operations_are_delivered() {
    let (session, handle) = capturing().await;
    let mut events = session.subscribe();

    for n in 0..5 {
        handle.push_scan(&format!("{}", 200 + n), 0).unwrap();
        assert!(session.list_users().await.is_success());
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        let event = next_event_of(&mut events, "finger_scanned").await;
        seen.push(scanned_user(&event).to_string());
    }
    assert_eq!(seen, vec!["200", "201", "202", "203", "204"]);
    assert_eq!(handle.busy_rejections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_operation_wait_exceeded() {
    let config = SessionConfig {
        operation_wait: Duration::from_millis(100),
        ..fast_config()
    };
    let (session, handle) = session_with(config);
    assert!(session.connect().await.is_success());
    handle.set_enroll_delay(Duration::from_millis(800));

    let enrolling = {
        let session = session.clone();
        tokio::spawn(async move {
            let user = UserId::new("9").unwrap();
            session.enroll_user(&user, FingerSlot::default()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), SessionState::Administering);

    let rejected = session.list_users().await;
    assert_eq!(rejected.error_kind(), Some(ErrorKind::ConcurrencyViolation));

    let enrolled = enrolling.await.unwrap();
    assert!(enrolled.is_success());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(handle.call_count(CallKind::GetUsers), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_operation_restores_capture() {
    let (session, handle) = capturing().await;
    handle.set_enroll_delay(Duration::from_millis(300));

    let user = UserId::new("77").unwrap();
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        session.enroll_user(&user, FingerSlot::default()),
    )
    .await;
    assert!(cancelled.is_err());

    // The dropped guard already restored capture
    assert_eq!(session.state(), SessionState::Capturing);
    assert!(session.list_users().await.is_success());
    assert_eq!(session.state(), SessionState::Capturing);
    assert_eq!(handle.busy_rejections(), 0);
}

/// Terminal whose stream reads block for `read_time` whatever timeout the
/// caller asks for.
struct SlowReads {
    inner: MockTransport,
    read_time: Duration,
}

impl DeviceTransport for SlowReads {
    fn connect(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.connect()
    }

    fn disconnect(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.disconnect()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.inner.set_timeout(timeout);
    }

    fn enable_device(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.enable_device()
    }

    fn disable_device(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.disable_device()
    }

    fn device_info(&mut self) -> biobridge_hardware::Result<DeviceInfo> {
        self.inner.device_info()
    }

    fn get_users(&mut self) -> biobridge_hardware::Result<Vec<DeviceUser>> {
        self.inner.get_users()
    }

    fn get_attendance(&mut self) -> biobridge_hardware::Result<Vec<AttendanceRecord>> {
        self.inner.get_attendance()
    }

    fn clear_attendance(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.clear_attendance()
    }

    fn delete_user(&mut self, user_id: &UserId) -> biobridge_hardware::Result<()> {
        self.inner.delete_user(user_id)
    }

    fn enroll_user(&mut self, user_id: &UserId, finger: FingerSlot) -> biobridge_hardware::Result<()> {
        self.inner.enroll_user(user_id, finger)
    }

    fn play_chime(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.play_chime()
    }

    fn start_live_stream(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.start_live_stream()
    }

    fn next_record(
        &mut self,
        _timeout: Duration,
    ) -> biobridge_hardware::Result<Option<AttendanceRecord>> {
        self.inner.next_record(self.read_time)
    }

    fn stop_live_stream(&mut self) -> biobridge_hardware::Result<()> {
        self.inner.stop_live_stream()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_read_outlasting_stop_wait_keeps_transport_exclusive() {
    let read_time = Duration::from_millis(400);
    let config = SessionConfig {
        stop_wait: Duration::from_millis(100),
        ..fast_config()
    };
    assert!(config.effective_stop_wait() < read_time);

    let (transport, handle) = MockTransport::new();
    let session = DeviceSession::with_transport(
        config,
        SlowReads {
            inner: transport,
            read_time,
        },
    );
    assert!(session.connect().await.is_success());
    handle.add_user("1", "Ada");

    for _ in 0..5 {
        assert!(session.start_capture().await.is_success());
        // Let the worker block in its read
        tokio::time::sleep(Duration::from_millis(30)).await;

        let users = session.list_users().await;
        assert!(users.is_success(), "list_users failed: {:?}", users.error);
        assert_eq!(session.state(), SessionState::Capturing);
        assert!(session.is_capture_requested());
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(session.stop_capture().await.is_success());
    // Stop returns only once the stream is closed
    assert!(!handle.is_streaming());
    assert_eq!(session.state(), SessionState::Ready);

    assert_eq!(handle.busy_rejections(), 0);
    assert_eq!(handle.call_count(CallKind::StartLiveStream), 6);
    assert_eq!(handle.call_count(CallKind::StopLiveStream), 6);
}
