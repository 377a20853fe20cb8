//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use std::time::Duration;

use biobridge_hardware::mock::{MockTransport, MockTransportHandle};
use biobridge_session::{DeviceSession, DomainEvent, SessionConfig, SessionState, Subscription};

/// Longest a test waits for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(3);

/// Session timings shrunk so tests run in milliseconds.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        address: "127.0.0.1".to_string(),
        connect_timeout: Duration::from_millis(500),
        enroll_timeout: Duration::from_millis(1500),
        poll_interval: Duration::from_millis(20),
        record_delay: Duration::from_millis(5),
        stop_wait: Duration::from_millis(300),
        reconnect_backoff: Duration::from_millis(100),
        manual_reconnect_delay: Duration::from_millis(10),
        enroll_settle: Duration::ZERO,
        operation_wait: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

pub fn session_with(config: SessionConfig) -> (DeviceSession, MockTransportHandle) {
    let (transport, handle) = MockTransport::new();
    (DeviceSession::with_transport(config, transport), handle)
}

pub fn session() -> (DeviceSession, MockTransportHandle) {
    session_with(fast_config())
}

pub async fn connected() -> (DeviceSession, MockTransportHandle) {
    let (session, handle) = session();
    let result = session.connect().await;
    assert!(result.is_success(), "connect failed: {:?}", result.error);
    (session, handle)
}

pub async fn capturing() -> (DeviceSession, MockTransportHandle) {
    let (session, handle) = connected().await;
    let result = session.start_capture().await;
    assert!(result.is_success(), "start_capture failed: {:?}", result.error);
    (session, handle)
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(subscription: &mut Subscription) -> DomainEvent {
    tokio::time::timeout(PATIENCE, subscription.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

/// Next event of the given wire type, skipping others.
pub async fn next_event_of(subscription: &mut Subscription, event_type: &str) -> DomainEvent {
    loop {
        let event = next_event(subscription).await;
        if event.event_type() == event_type {
            return event;
        }
    }
}

/// Assert that nothing is published within `window`.
pub async fn assert_quiet(subscription: &mut Subscription, window: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(window, subscription.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

pub async fn wait_for_state(session: &DeviceSession, state: SessionState) {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while session.state() != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session stuck in {} waiting for {}",
            session.state(),
            state
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// User id of a `finger_scanned` event.
pub fn scanned_user(event: &DomainEvent) -> &str {
    match &event.kind {
        biobridge_session::EventKind::ScanDetected { user_id, .. } => user_id,
        other => panic!("expected finger_scanned, got {other:?}"),
    }
}
