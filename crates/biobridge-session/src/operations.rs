//! Administrative operations.
//!
//! Each one runs inside an [`OperationGuard`] so it never overlaps the
//! capture loop, and reports through [`OperationResult`].

use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use biobridge_core::{Error, FingerSlot, UserId};
use biobridge_hardware::{AttendanceRecord, DeviceInfo, DeviceTransport, DeviceUser};

use crate::bus::EventBus;
use crate::events::DomainEvent;
use crate::guard::OperationGuard;
use crate::result::OperationResult;
use crate::session::DeviceSession;

/// Outcome of a successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentReceipt {
    pub user_id: UserId,
    pub finger_id: FingerSlot,
    /// An existing user with the same id was deleted first.
    pub replaced: bool,
}

/// Reports a started enrollment as failed if it is dropped unsettled.
struct PendingEnrollment<'a> {
    bus: &'a EventBus,
    user_id: &'a UserId,
    finger: FingerSlot,
    settled: bool,
}

impl PendingEnrollment<'_> {
    fn settle(mut self, event: DomainEvent) {
        self.settled = true;
        self.bus.publish(event);
    }
}

impl Drop for PendingEnrollment<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(user_id = %self.user_id, finger = %self.finger, "Enrollment cancelled");
            self.bus
                .publish(DomainEvent::enrollment_failed(self.user_id, self.finger, "cancelled"));
        }
    }
}

#[derive(Clone, Copy)]
struct EnrollTimings {
    enroll_timeout: Duration,
    normal_timeout: Duration,
    settle: Duration,
}

impl DeviceSession {
    async fn run_operation<T, F>(&self, operation: &'static str, f: F) -> OperationResult<T>
    where
        F: FnOnce(&mut dyn DeviceTransport) -> biobridge_hardware::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = match OperationGuard::acquire(&self.inner, operation).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("{} not started: {}", operation, e);
                return OperationResult::failed(e);
            }
        };

        let result = guard.inner().with_transport(f).await.map_err(Error::from);
        if let Err(e) = &result {
            warn!("{} failed: {}", operation, e);
        }

        drop(guard);
        result.into()
    }

    /// All users registered on the terminal.
    pub async fn list_users(&self) -> OperationResult<Vec<DeviceUser>> {
        self.run_operation("list_users", |t| t.get_users()).await
    }

    /// Attendance log stored on the terminal.
    pub async fn list_attendance(&self) -> OperationResult<Vec<AttendanceRecord>> {
        self.run_operation("list_attendance", |t| t.get_attendance()).await
    }

    pub async fn clear_attendance(&self) -> OperationResult<()> {
        let result = self
            .run_operation("clear_attendance", |t| t.clear_attendance())
            .await;
        if result.is_success() {
            info!("Attendance log cleared");
        }
        result
    }

    /// Query the terminal identity and refresh the cached copy.
    pub async fn device_info(&self) -> OperationResult<DeviceInfo> {
        let result = self.run_operation("device_info", |t| t.device_info()).await;
        if let Some(info) = &result.data {
            self.inner.core().device_info = Some(info.clone());
        }
        result
    }

    /// Remove a user and its templates. Polling is re-enabled even when
    /// the delete fails.
    pub async fn delete_user(&self, user_id: &UserId) -> OperationResult<()> {
        let id = user_id.clone();
        let result = self
            .run_operation("delete_user", move |t| delete_with_device_disabled(t, &id))
            .await;
        if result.is_success() {
            info!(user_id = %user_id, "User deleted");
        }
        result
    }

    /// Enroll one finger of `user_id`, replacing the user if it exists.
    ///
    /// Blocks until the person scanned the finger or the enroll timeout
    /// expired. Progress is published as `enrollment_started` followed by
    /// `enrollment_complete` or `enrollment_error`, the latter also when the
    /// returned future is dropped midway. Capture that was running
    /// before the call is running after it, whatever the outcome.
    pub async fn enroll_user(
        &self,
        user_id: &UserId,
        finger: FingerSlot,
    ) -> OperationResult<EnrollmentReceipt> {
        let bus = &self.inner.bus;

        let guard = match OperationGuard::acquire(&self.inner, "enroll_user").await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(user_id = %user_id, "Enrollment not started: {}", e);
                bus.publish(DomainEvent::enrollment_failed(user_id, finger, e.to_string()));
                return OperationResult::failed(e);
            }
        };

        info!(user_id = %user_id, finger = %finger, "Enrollment started");
        bus.publish(DomainEvent::enrollment_started(user_id, finger));
        let pending = PendingEnrollment {
            bus,
            user_id,
            finger,
            settled: false,
        };

        let config = &guard.inner().config;
        let timings = EnrollTimings {
            enroll_timeout: config.enroll_timeout,
            normal_timeout: config.connect_timeout,
            settle: config.enroll_settle,
        };

        let id = user_id.clone();
        let outcome = guard
            .inner()
            .with_transport(move |t| enroll_on_fresh_link(t, &id, finger, timings))
            .await
            .map_err(Error::from);

        let result = match outcome {
            Ok(replaced) => {
                info!(user_id = %user_id, finger = %finger, replaced, "Enrollment complete");
                pending.settle(DomainEvent::enrollment_completed(user_id, finger));
                OperationResult::ok(EnrollmentReceipt {
                    user_id: user_id.clone(),
                    finger_id: finger,
                    replaced,
                })
            }
            Err(e) => {
                error!(user_id = %user_id, finger = %finger, "Enrollment failed: {}", e);
                pending.settle(DomainEvent::enrollment_failed(user_id, finger, e.to_string()));
                OperationResult::failed(e)
            }
        };

        drop(guard);
        result
    }
}

fn delete_with_device_disabled(
    transport: &mut dyn DeviceTransport,
    user_id: &UserId,
) -> biobridge_hardware::Result<()> {
    transport.disable_device()?;
    let deleted = transport.delete_user(user_id);
    let enabled = transport.enable_device();
    deleted.and(enabled)
}

/// Run the enrollment with the long timeout, restoring the normal timeout
/// and polling on every path.
fn enroll_on_fresh_link(
    transport: &mut dyn DeviceTransport,
    user_id: &UserId,
    finger: FingerSlot,
    timings: EnrollTimings,
) -> biobridge_hardware::Result<bool> {
    transport.set_timeout(timings.enroll_timeout);

    let outcome = enroll_steps(transport, user_id, finger, timings.settle);
    if outcome.is_err()
        && let Err(e) = transport.enable_device()
    {
        debug!("Re-enabling terminal after failed enrollment: {}", e);
    }

    transport.set_timeout(timings.normal_timeout);
    outcome
}

fn enroll_steps(
    transport: &mut dyn DeviceTransport,
    user_id: &UserId,
    finger: FingerSlot,
    settle: Duration,
) -> biobridge_hardware::Result<bool> {
    // Enrollment is only reliable on a freshly opened link
    if let Err(e) = transport.disconnect() {
        debug!("Closing link before enrollment: {}", e);
    }
    transport.connect()?;
    if !settle.is_zero() {
        thread::sleep(settle);
    }

    let replaced = transport
        .get_users()?
        .iter()
        .any(|user| user.user_id == user_id.as_str());
    if replaced {
        info!(user_id = %user_id, "User exists, deleting before re-enrollment");
        if let Err(e) = delete_with_device_disabled(transport, user_id) {
            warn!(user_id = %user_id, "Deleting existing user failed: {}", e);
        }
    }

    transport.enroll_user(user_id, finger)?;

    if let Err(e) = transport.play_chime() {
        debug!("Chime failed: {}", e);
    }
    transport.enable_device()?;

    Ok(replaced)
}
