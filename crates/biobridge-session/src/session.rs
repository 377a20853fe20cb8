//! Device session: the owned state, connection lifecycle and capture
//! control of one fingerprint terminal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, error, info, warn};

use biobridge_core::{Error, Result};
use biobridge_hardware::{DeviceInfo, DeviceTransport, HardwareError};

use crate::bus::{EventBus, SubscriberId, Subscription};
use crate::capture::{self, CaptureHandle};
use crate::config::SessionConfig;
use crate::reconnect::{self, SessionSignal};
use crate::result::OperationResult;
use crate::state::{SessionState, SessionStateMachine, StateTransition};

pub(crate) type SharedTransport = Arc<Mutex<Box<dyn DeviceTransport>>>;

/// Mutable session state, guarded by a single lock.
pub(crate) struct SessionCore {
    pub(crate) machine: SessionStateMachine,
    /// Capture was asked for and not explicitly stopped.
    pub(crate) capture_requested: bool,
    pub(crate) capture: Option<CaptureHandle>,
    pub(crate) next_run: u64,
    pub(crate) device_info: Option<DeviceInfo>,
}

impl SessionCore {
    pub(crate) fn state(&self) -> SessionState {
        self.machine.current_state()
    }

    pub(crate) fn transition(&mut self, to: SessionState) -> Result<StateTransition> {
        let transition = self.machine.transition_to(to)?;
        debug!(from = %transition.from, to = %transition.to, "Session state changed");
        Ok(transition)
    }

    /// Transition only if the session is currently in `from`.
    pub(crate) fn transition_from(&mut self, from: SessionState, to: SessionState) -> bool {
        self.state() == from && self.transition(to).is_ok()
    }

    pub(crate) fn is_current_run(&self, run_id: u64) -> bool {
        self.capture.as_ref().is_some_and(|c| c.run_id == run_id)
    }
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    pub(crate) transport: SharedTransport,
    pub(crate) bus: EventBus,
    core: Mutex<SessionCore>,
    operations: Arc<tokio::sync::Mutex<()>>,
    signals: mpsc::UnboundedSender<SessionSignal>,
}

impl SessionInner {
    pub(crate) fn core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        self.core().state()
    }

    pub(crate) fn lock_transport(&self) -> MutexGuard<'_, Box<dyn DeviceTransport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the transport reports an open link.
    ///
    /// A transport busy with a call is taken as open; callers combine this
    /// with the state, which already excludes closed states.
    pub(crate) fn link_open(&self) -> bool {
        match self.transport.try_lock() {
            Ok(transport) => transport.is_open(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_open(),
            Err(TryLockError::WouldBlock) => true,
        }
    }

    /// Claim the session for `operation`, waiting at most
    /// `operation_wait` for the current holder.
    pub(crate) async fn begin_operation(&self, operation: &str) -> Result<OwnedMutexGuard<()>> {
        let wait = self.config.operation_wait;
        match tokio::time::timeout(wait, Arc::clone(&self.operations).lock_owned()).await {
            Ok(permit) => Ok(permit),
            Err(_) => {
                warn!(
                    "{} rejected: session busy for more than {}ms",
                    operation,
                    wait.as_millis()
                );
                Err(Error::ConcurrencyViolation {
                    operation: operation.to_string(),
                })
            }
        }
    }

    /// Claim the session without a deadline.
    pub(crate) async fn begin_exclusive(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.operations).lock_owned().await
    }

    /// Run `f` against the transport on a blocking thread.
    pub(crate) async fn with_transport<T, F>(&self, f: F) -> biobridge_hardware::Result<T>
    where
        F: FnOnce(&mut dyn DeviceTransport) -> biobridge_hardware::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        tokio::task::spawn_blocking(move || {
            let mut transport = transport.lock().unwrap_or_else(PoisonError::into_inner);
            f(transport.as_mut())
        })
        .await
        .map_err(|e| HardwareError::other(format!("transport task failed: {e}")))?
    }

    pub(crate) fn signal(&self, signal: SessionSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Session supervisor gone, signal dropped");
        }
    }

    /// Close the link, logging instead of failing.
    pub(crate) async fn close_link(&self) {
        if let Err(e) = self.with_transport(|t| t.disconnect()).await {
            warn!("Closing link to {} failed: {}", self.config.endpoint(), e);
        }
    }

    /// Open the link and move to `Ready`. Caller holds the operation permit.
    pub(crate) async fn establish(&self) -> Result<DeviceInfo> {
        {
            let mut core = self.core();
            match core.state() {
                state @ (SessionState::Ready | SessionState::Capturing) => {
                    warn!("connect() ignored: session already {}", state);
                    return core
                        .device_info
                        .clone()
                        .ok_or_else(|| Error::invalid_state("connect", state));
                }
                SessionState::Disconnected | SessionState::Failed | SessionState::Reconnecting => {
                    core.transition(SessionState::Connecting)?;
                }
                state => return Err(Error::invalid_state("connect", state)),
            }
        }

        let endpoint = self.config.endpoint();
        info!("Connecting to fingerprint terminal at {}", endpoint);

        let timeout = self.config.connect_timeout;
        let outcome = self.with_transport(move |t| open_link(t, timeout)).await;

        let mut core = self.core();
        match outcome {
            Ok(info) => {
                core.transition(SessionState::Ready)?;
                core.device_info = Some(info.clone());
                info!(
                    "Connected to {} (firmware {})",
                    endpoint,
                    info.firmware_version.as_deref().unwrap_or("unknown")
                );
                Ok(info)
            }
            Err(e) => {
                core.transition(SessionState::Failed)?;
                error!("Connection to {} failed: {}", endpoint, e);
                Err(Error::Connection(e.to_string()))
            }
        }
    }
}

/// Connect, then disable, identify and re-enable the terminal.
fn open_link(
    transport: &mut dyn DeviceTransport,
    timeout: Duration,
) -> biobridge_hardware::Result<DeviceInfo> {
    transport.set_timeout(timeout);
    transport.connect()?;

    let handshake = identify(transport);
    if handshake.is_err()
        && let Err(e) = transport.disconnect()
    {
        debug!("Closing half-open link failed: {}", e);
    }
    handshake
}

fn identify(transport: &mut dyn DeviceTransport) -> biobridge_hardware::Result<DeviceInfo> {
    transport.disable_device()?;
    let info = transport.device_info()?;
    transport.enable_device()?;
    Ok(info)
}

/// Status snapshot for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connected: bool,
    pub capture_requested: bool,
    pub endpoint: String,
    pub device: Option<DeviceInfo>,
    pub subscribers: usize,
    pub events_published: u64,
    pub events_dropped: u64,
    pub time_in_state_ms: u64,
    pub recent_transitions: usize,
}

/// Handle to the session of one fingerprint terminal.
///
/// Cloning is cheap and every clone drives the same session. All transport
/// access is serialized: connection changes, capture start/stop,
/// administrative operations and reconnection never overlap.
///
/// # Examples
///
/// ```
/// use biobridge_hardware::mock::MockTransport;
/// use biobridge_session::{DeviceSession, SessionConfig, SessionState};
///
/// # #[tokio::main]
/// # async fn main() {
/// let (transport, handle) = MockTransport::new();
/// let session = DeviceSession::with_transport(SessionConfig::default(), transport);
///
/// assert!(session.connect().await.is_success());
/// assert!(session.start_capture().await.is_success());
/// assert_eq!(session.state(), SessionState::Capturing);
///
/// // Administrative calls pause and resume capture on their own
/// let users = session.list_users().await;
/// assert!(users.is_success());
/// assert_eq!(session.state(), SessionState::Capturing);
/// assert_eq!(handle.busy_rejections(), 0);
///
/// session.disconnect().await;
/// # }
/// ```
#[derive(Clone)]
pub struct DeviceSession {
    pub(crate) inner: Arc<SessionInner>,
}

impl DeviceSession {
    /// Create a session around `transport` in the `Disconnected` state.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, which hosts the session
    /// supervisor.
    pub fn new(config: SessionConfig, transport: Box<dyn DeviceTransport>) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(config.subscriber_capacity);

        let inner = Arc::new(SessionInner {
            config,
            transport: Arc::new(Mutex::new(transport)),
            bus,
            core: Mutex::new(SessionCore {
                machine: SessionStateMachine::new(),
                capture_requested: false,
                capture: None,
                next_run: 0,
                device_info: None,
            }),
            operations: Arc::new(tokio::sync::Mutex::new(())),
            signals,
        });

        tokio::spawn(reconnect::supervise(Arc::downgrade(&inner), signal_rx));

        Self { inner }
    }

    pub fn with_transport<T: DeviceTransport + 'static>(config: SessionConfig, transport: T) -> Self {
        Self::new(config, Box::new(transport))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether the session holds an open link to the terminal.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected() && self.inner.link_open()
    }

    pub fn is_capture_requested(&self) -> bool {
        self.inner.core().capture_requested
    }

    /// Cached identity from the last successful connect.
    pub fn cached_device_info(&self) -> Option<DeviceInfo> {
        self.inner.core().device_info.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    pub fn status(&self) -> SessionStatus {
        let stats = self.inner.bus.stats();
        let link_open = self.inner.link_open();
        let core = self.inner.core();

        SessionStatus {
            state: core.state(),
            connected: core.state().is_connected() && link_open,
            capture_requested: core.capture_requested,
            endpoint: self.inner.config.endpoint(),
            device: core.device_info.clone(),
            subscribers: stats.subscribers,
            events_published: stats.published,
            events_dropped: stats.dropped,
            time_in_state_ms: u64::try_from(core.machine.time_in_current_state().as_millis())
                .unwrap_or(u64::MAX),
            recent_transitions: core.machine.history().len(),
        }
    }

    /// Open the link to the terminal.
    ///
    /// Valid from `Disconnected`, `Failed` and `Reconnecting`. Calling it
    /// on a connected session logs a warning and returns the cached info.
    pub async fn connect(&self) -> OperationResult<DeviceInfo> {
        let _permit = match self.inner.begin_operation("connect").await {
            Ok(permit) => permit,
            Err(e) => return OperationResult::failed(e),
        };
        self.inner.establish().await.into()
    }

    /// Stop capture, close the link and move to `Disconnected`.
    ///
    /// Always succeeds; close errors are logged.
    pub async fn disconnect(&self) -> OperationResult<()> {
        let _permit = self.inner.begin_exclusive().await;

        if self.state() == SessionState::Disconnected {
            debug!("disconnect() on a disconnected session");
            return OperationResult::ok(());
        }

        capture::stop(&self.inner, true).await;
        self.inner.close_link().await;

        let mut core = self.inner.core();
        core.capture_requested = false;
        if let Err(e) = core.transition(SessionState::Disconnected) {
            warn!("Forcing disconnect from unexpected state: {}", e);
        }
        info!("Disconnected from {}", self.inner.config.endpoint());
        OperationResult::ok(())
    }

    /// Begin continuous capture. Valid from `Ready`; a no-op when already
    /// capturing.
    pub async fn start_capture(&self) -> OperationResult<()> {
        let _permit = match self.inner.begin_operation("start_capture").await {
            Ok(permit) => permit,
            Err(e) => return OperationResult::failed(e),
        };
        capture::start(&self.inner).into()
    }

    /// Stop capture and wait for the worker to exit.
    pub async fn stop_capture(&self) -> OperationResult<()> {
        let _permit = match self.inner.begin_operation("stop_capture").await {
            Ok(permit) => permit,
            Err(e) => return OperationResult::failed(e),
        };
        capture::stop(&self.inner, true).await;
        OperationResult::ok(())
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("endpoint", &self.inner.config.endpoint())
            .field("state", &self.state())
            .finish()
    }
}
