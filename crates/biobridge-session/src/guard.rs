use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, warn};

use biobridge_core::{Error, Result};

use crate::capture;
use crate::events::DomainEvent;
use crate::reconnect::SessionSignal;
use crate::session::SessionInner;
use crate::state::SessionState;

/// Scope of one administrative operation.
///
/// Acquiring pauses capture and moves the session to `Administering`.
/// Dropping the guard, on any path including a cancelled future, moves
/// back to `Ready` and resumes capture if it was running. When the
/// operation left the link closed the session moves to `Reconnecting`
/// instead and the supervisor takes over. The operation permit is released
/// only after that restore.
pub(crate) struct OperationGuard {
    inner: Arc<SessionInner>,
    operation: &'static str,
    resume_capture: bool,
    entered: bool,
    _permit: OwnedMutexGuard<()>,
}

impl OperationGuard {
    pub(crate) async fn acquire(inner: &Arc<SessionInner>, operation: &'static str) -> Result<Self> {
        let permit = inner.begin_operation(operation).await?;

        let resume_capture = inner.state() == SessionState::Capturing;
        if resume_capture {
            debug!("Pausing capture for {}", operation);
            capture::stop(inner, false).await;
        }

        let mut guard = Self {
            inner: Arc::clone(inner),
            operation,
            resume_capture,
            entered: false,
            _permit: permit,
        };

        let entered = {
            let mut core = inner.core();
            match core.state() {
                SessionState::Ready => core.transition(SessionState::Administering).map(|_| ()),
                state => Err(Error::invalid_state(operation, state)),
            }
        };
        guard.entered = entered.is_ok();
        entered?;

        Ok(guard)
    }

    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let mut link_lost = false;
        if self.entered {
            let open = self.inner.link_open();
            let mut core = self.inner.core();
            let to = if open {
                SessionState::Ready
            } else {
                SessionState::Reconnecting
            };
            if core.transition_from(SessionState::Administering, to) {
                link_lost = !open;
            } else {
                warn!("Session left Administering during {}", self.operation);
            }
        }

        if link_lost {
            // Capture intent is kept; the reconnect resumes it
            let reason = format!("link closed during {}", self.operation);
            error!("{}", reason);
            self.inner.bus.publish(DomainEvent::device_disconnected(reason.as_str()));
            self.inner.signal(SessionSignal::LinkLost { reason });
            return;
        }

        if self.resume_capture {
            match capture::start(&self.inner) {
                Ok(()) => debug!("Capture resumed after {}", self.operation),
                Err(e) => warn!("Could not resume capture after {}: {}", self.operation, e),
            }
        }
    }
}
