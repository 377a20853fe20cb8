//! Reconnection after a lost live stream, and manual reconnect.
//!
//! Neither the capture worker nor an operation reconnects itself. They move
//! the session to `Reconnecting` and send a [`SessionSignal`]; the
//! supervisor task waits the backoff and makes exactly one attempt under
//! the operation permit.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use biobridge_hardware::DeviceInfo;

use crate::capture;
use crate::events::DomainEvent;
use crate::result::OperationResult;
use crate::session::{DeviceSession, SessionInner};
use crate::state::SessionState;

/// Message to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionSignal {
    /// The live stream or an operation found the link closed.
    LinkLost { reason: String },
}

/// Handle signals until every session handle is gone.
pub(crate) async fn supervise(
    session: Weak<SessionInner>,
    mut signals: mpsc::UnboundedReceiver<SessionSignal>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            SessionSignal::LinkLost { reason } => {
                let Some(inner) = session.upgrade() else {
                    break;
                };
                info!(
                    "Reconnecting to {} in {}ms after: {}",
                    inner.config.endpoint(),
                    inner.config.reconnect_backoff.as_millis(),
                    reason
                );
                let backoff = inner.config.reconnect_backoff;
                drop(inner);

                tokio::time::sleep(backoff).await;

                let Some(inner) = session.upgrade() else {
                    break;
                };
                recover(&inner).await;
            }
        }
    }
    debug!("Session supervisor stopped");
}

async fn recover(inner: &Arc<SessionInner>) {
    let _permit = inner.begin_exclusive().await;

    let state = inner.state();
    if state != SessionState::Reconnecting {
        debug!("Reconnect skipped: session is {}", state);
        return;
    }

    inner.close_link().await;

    match inner.establish().await {
        Ok(_) => {
            info!("Reconnected to {}", inner.config.endpoint());
            let resume = inner.core().capture_requested;
            if resume && let Err(e) = capture::start(inner) {
                warn!("Could not resume capture after reconnect: {}", e);
            }
        }
        Err(e) => {
            error!("Reconnect to {} failed: {}", inner.config.endpoint(), e);
            inner
                .bus
                .publish(DomainEvent::capture_error(format!("reconnect failed: {e}")));
        }
    }
}

impl DeviceSession {
    /// Close and reopen the link, then resume capture if it was running or
    /// requested.
    pub async fn reconnect(&self) -> OperationResult<DeviceInfo> {
        let inner = &self.inner;
        let _permit = match inner.begin_operation("reconnect").await {
            Ok(permit) => permit,
            Err(e) => return OperationResult::failed(e),
        };

        let resume = {
            let core = inner.core();
            core.capture_requested || core.state() == SessionState::Capturing
        };

        info!("Manual reconnect to {}", inner.config.endpoint());
        capture::stop(inner, false).await;
        inner.close_link().await;

        {
            let mut core = inner.core();
            if matches!(core.state(), SessionState::Ready | SessionState::Failed)
                && let Err(e) = core.transition(SessionState::Reconnecting)
            {
                warn!("Manual reconnect from unexpected state: {}", e);
            }
        }

        tokio::time::sleep(inner.config.manual_reconnect_delay).await;

        let result = inner.establish().await;
        if result.is_ok()
            && resume
            && let Err(e) = capture::start(inner)
        {
            warn!("Could not resume capture after reconnect: {}", e);
        }
        result.into()
    }
}
