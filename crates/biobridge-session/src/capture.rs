//! Continuous capture on a blocking thread.
//!
//! The worker holds the transport for one poll at a time. Cancellation is
//! observed under that hold, so once [`stop`] returns no read is in flight
//! and the live stream is closed.

use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use biobridge_core::{Error, Result};
use biobridge_hardware::{DeviceTransport, HardwareError};

use crate::bus::EventBus;
use crate::events::DomainEvent;
use crate::reconnect::SessionSignal;
use crate::session::{SessionInner, SharedTransport};
use crate::state::SessionState;

/// Running capture loop owned by the session core.
pub(crate) struct CaptureHandle {
    pub(crate) run_id: u64,
    token: CancellationToken,
    worker: JoinHandle<CaptureExit>,
}

/// Why a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CaptureExit {
    Stopped,
    StreamLost(String),
    Failed(String),
}

struct Worker {
    run_id: u64,
    session: Weak<SessionInner>,
    transport: SharedTransport,
    bus: EventBus,
    token: CancellationToken,
    poll_interval: Duration,
    record_delay: Duration,
}

/// Start the capture loop. Caller holds the operation permit or restores
/// a guard it owns.
pub(crate) fn start(inner: &Arc<SessionInner>) -> Result<()> {
    let mut core = inner.core();
    match core.state() {
        SessionState::Capturing => {
            warn!("start_capture() ignored: capture already running");
            return Ok(());
        }
        SessionState::Ready => {}
        state => return Err(Error::invalid_state("start capture", state)),
    }

    let runtime = Handle::try_current()
        .map_err(|_| Error::Config("capture requires a Tokio runtime".to_string()))?;

    core.transition(SessionState::Capturing)?;
    core.capture_requested = true;
    core.next_run += 1;

    let token = CancellationToken::new();
    let worker = Worker {
        run_id: core.next_run,
        session: Arc::downgrade(inner),
        transport: Arc::clone(&inner.transport),
        bus: inner.bus.clone(),
        token: token.clone(),
        poll_interval: inner.config.poll_interval,
        record_delay: inner.config.record_delay,
    };
    let run_id = worker.run_id;

    // The worker reports its exit through the core, which stays locked
    // until the handle is stored.
    let join = runtime.spawn_blocking(move || worker.run());
    core.capture = Some(CaptureHandle {
        run_id,
        token,
        worker: join,
    });

    info!(run = run_id, "Capture started");
    Ok(())
}

/// Cancel the capture loop and wait for it to exit, then return to `Ready`.
///
/// A worker blocked in a read past `effective_stop_wait` is logged and
/// still awaited: the live stream is closed only by the worker, and the
/// transport must not be handed on while it is open. The join runs on its
/// own task, so the session settles even if the caller is dropped.
///
/// `clear_intent` distinguishes an explicit stop from a pause around an
/// administrative operation.
pub(crate) async fn stop(inner: &Arc<SessionInner>, clear_intent: bool) {
    let handle = {
        let mut core = inner.core();
        if clear_intent {
            core.capture_requested = false;
        }
        core.capture.take()
    };

    let Some(CaptureHandle {
        run_id,
        token,
        mut worker,
    }) = handle
    else {
        return;
    };

    token.cancel();
    let session = Arc::clone(inner);
    let join = tokio::spawn(async move {
        let wait = session.config.effective_stop_wait();
        let joined = match tokio::time::timeout(wait, &mut worker).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    run = run_id,
                    "Capture worker still reading after {}ms, waiting for it to return",
                    wait.as_millis()
                );
                worker.await
            }
        };
        match joined {
            Ok(exit) => debug!(run = run_id, ?exit, "Capture worker exited"),
            Err(e) => error!(run = run_id, "Capture worker panicked: {}", e),
        }

        if session
            .core()
            .transition_from(SessionState::Capturing, SessionState::Ready)
        {
            info!(run = run_id, "Capture stopped");
        }
    });

    if let Err(e) = join.await {
        error!(run = run_id, "Capture stop task failed: {}", e);
    }
}

impl Worker {
    fn run(self) -> CaptureExit {
        let exit = self.capture();
        self.finish(&exit);
        exit
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn DeviceTransport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.session.strong_count() == 0
    }

    fn capture(&self) -> CaptureExit {
        {
            let mut transport = self.lock();
            if self.should_stop() {
                return CaptureExit::Stopped;
            }
            if let Err(e) = transport.start_live_stream() {
                return classify(e);
            }
        }
        debug!(run = self.run_id, "Live stream open");

        loop {
            let record = {
                let mut transport = self.lock();
                if self.should_stop() {
                    close_stream(transport.as_mut());
                    return CaptureExit::Stopped;
                }

                match transport.next_record(self.poll_interval) {
                    Ok(record) => record,
                    Err(e) if e.is_malformed() => {
                        warn!(run = self.run_id, "Skipping malformed record: {}", e);
                        continue;
                    }
                    Err(e) => {
                        let exit = classify(e);
                        if matches!(exit, CaptureExit::Failed(_)) {
                            close_stream(transport.as_mut());
                        }
                        return exit;
                    }
                }
            };

            let Some(record) = record else {
                trace!(run = self.run_id, "Poll returned no record");
                continue;
            };

            trace!(
                run = self.run_id,
                user_id = %record.user_id,
                punch = record.punch,
                "Scan received"
            );
            self.bus.publish(DomainEvent::scan_detected(&record));

            if self.should_stop() {
                close_stream(self.lock().as_mut());
                return CaptureExit::Stopped;
            }
            std::thread::sleep(self.record_delay);
        }
    }

    /// Apply the exit to the session unless this run was already stopped
    /// or replaced.
    fn finish(&self, exit: &CaptureExit) {
        let Some(inner) = self.session.upgrade() else {
            return;
        };

        let mut core = inner.core();
        if !core.is_current_run(self.run_id) {
            return;
        }
        core.capture = None;

        match exit {
            CaptureExit::Stopped => {
                core.transition_from(SessionState::Capturing, SessionState::Ready);
            }
            CaptureExit::StreamLost(reason) => {
                error!(run = self.run_id, "Live stream lost: {}", reason);
                core.transition_from(SessionState::Capturing, SessionState::Reconnecting);
                drop(core);
                inner.bus.publish(DomainEvent::device_disconnected(reason.as_str()));
                inner.signal(SessionSignal::LinkLost {
                    reason: reason.clone(),
                });
            }
            CaptureExit::Failed(reason) => {
                error!(run = self.run_id, "Capture failed: {}", reason);
                core.capture_requested = false;
                core.transition_from(SessionState::Capturing, SessionState::Ready);
                drop(core);
                inner.bus.publish(DomainEvent::capture_error(reason.as_str()));
            }
        }
    }
}

fn classify(error: HardwareError) -> CaptureExit {
    if error.is_network() {
        CaptureExit::StreamLost(error.to_string())
    } else {
        CaptureExit::Failed(error.to_string())
    }
}

fn close_stream(transport: &mut dyn DeviceTransport) {
    if let Err(e) = transport.stop_live_stream() {
        debug!("Closing live stream failed: {}", e);
    }
}
