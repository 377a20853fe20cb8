//! Electric lock control over a serial line.
//!
//! The lock controller understands two single-byte commands:
//! [`LOCK_OPEN_COMMAND`] releases the strike and [`LOCK_CLOSE_COMMAND`]
//! engages it. [`DoorLock`] adds the auto-close timer on top of any
//! [`LockActuator`].
//!
//! ```no_run
//! # #[cfg(feature = "hardware-serial")]
//! # async fn example() -> biobridge_hardware::Result<()> {
//! use std::time::Duration;
//! use biobridge_core::config::DoorLockConfig;
//! use biobridge_hardware::lock::{DoorLock, SerialActuator};
//!
//! let actuator = SerialActuator::open(&DoorLockConfig::default())?;
//! let lock = DoorLock::new(actuator);
//! lock.open_for(Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use biobridge_core::constants::{DEFAULT_LOCK_OPEN_SECS, LOCK_CLOSE_COMMAND, LOCK_OPEN_COMMAND};

use crate::traits::LockActuator;
use crate::{HardwareError, Result};

/// Lock actuator writing single-byte commands to any byte sink.
///
/// Use [`SerialActuator::open`] (feature `hardware-serial`) for a real
/// serial port, or wrap an in-memory writer for tests.
#[derive(Debug)]
pub struct SerialActuator<W> {
    port: W,
    name: String,
}

impl<W: Write + Send> SerialActuator<W> {
    pub fn new(name: impl Into<String>, port: W) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }

    fn write_command(&mut self, command: u8) -> Result<()> {
        self.port
            .write_all(&[command])
            .and_then(|()| self.port.flush())
            .map_err(|e| HardwareError::communication(format!("{}: {e}", self.name)))
    }
}

#[cfg(feature = "hardware-serial")]
impl SerialActuator<Box<dyn serialport::SerialPort>> {
    /// Open the configured serial port at 8N1.
    ///
    /// # Errors
    /// Returns `HardwareError::CommunicationError` if the port cannot be
    /// opened.
    pub fn open(config: &biobridge_core::config::DoorLockConfig) -> Result<Self> {
        use biobridge_core::constants::DEFAULT_LOCK_SERIAL_TIMEOUT_MS;

        let port = serialport::new(config.port.as_str(), config.baudrate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(DEFAULT_LOCK_SERIAL_TIMEOUT_MS))
            .open()
            .map_err(|e| {
                HardwareError::communication(format!("cannot open {}: {e}", config.port))
            })?;

        info!(
            "Door lock connected on {} at {} baud",
            config.port, config.baudrate
        );
        Ok(Self::new(config.port.clone(), port))
    }
}

impl<W: Write + Send> LockActuator for SerialActuator<W> {
    fn send_open(&mut self) -> Result<()> {
        self.write_command(LOCK_OPEN_COMMAND)
    }

    fn send_close(&mut self) -> Result<()> {
        self.write_command(LOCK_CLOSE_COMMAND)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Snapshot of the lock for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub port: String,
    pub is_open: bool,
    pub auto_close_pending: bool,
}

/// Lock controller with a timed auto-close.
///
/// Opening arms a timer that sends the close command when it expires.
/// Opening again re-arms the timer; closing cancels it. Every command sent
/// bumps a generation under the actuator lock, and a timer only closes the
/// door if nothing was sent since it was armed.
pub struct DoorLock<A: LockActuator + 'static> {
    actuator: Arc<Mutex<A>>,
    open: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    auto_close: Mutex<Option<JoinHandle<()>>>,
    default_open: Duration,
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A: LockActuator + 'static> DoorLock<A> {
    pub fn new(actuator: A) -> Self {
        Self {
            actuator: Arc::new(Mutex::new(actuator)),
            open: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            auto_close: Mutex::new(None),
            default_open: Duration::from_secs(DEFAULT_LOCK_OPEN_SECS),
        }
    }

    /// Override the release time used by [`open`](Self::open).
    pub fn with_default_open(mut self, duration: Duration) -> Self {
        self.default_open = duration;
        self
    }

    /// Release the lock for the default duration.
    ///
    /// # Errors
    /// See [`open_for`](Self::open_for).
    pub fn open(&self) -> Result<()> {
        self.open_for(self.default_open)
    }

    /// Release the lock and close it again after `duration`.
    ///
    /// Must be called from within a tokio runtime, which drives the timer.
    ///
    /// # Errors
    /// Returns `HardwareError::ConfigurationError` outside a runtime and
    /// `HardwareError::CommunicationError` if the command cannot be written.
    pub fn open_for(&self, duration: Duration) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            HardwareError::configuration("door lock timers require a tokio runtime")
        })?;

        // A timer waking from here on sees the new generation and skips
        let armed = {
            let mut actuator = lock_unpoisoned(&self.actuator);
            actuator.send_open()?;
            self.open.store(true, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!("Door unlocked for {}ms", duration.as_millis());

        let actuator = Arc::clone(&self.actuator);
        let open = Arc::clone(&self.open);
        let generation = Arc::clone(&self.generation);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let mut actuator = lock_unpoisoned(&actuator);
            if generation.load(Ordering::SeqCst) != armed {
                debug!("Auto-close superseded");
                return;
            }
            match actuator.send_close() {
                Ok(()) => {
                    open.store(false, Ordering::SeqCst);
                    debug!("Door locked automatically");
                }
                Err(e) => warn!("Auto-close failed: {}", e),
            }
        });

        if let Some(previous) = lock_unpoisoned(&self.auto_close).replace(timer) {
            previous.abort();
        }
        Ok(())
    }

    /// Engage the lock now and cancel any pending auto-close.
    ///
    /// # Errors
    /// Returns `HardwareError::CommunicationError` if the command cannot be
    /// written.
    pub fn close(&self) -> Result<()> {
        if let Some(timer) = lock_unpoisoned(&self.auto_close).take() {
            timer.abort();
        }

        {
            let mut actuator = lock_unpoisoned(&self.actuator);
            self.generation.fetch_add(1, Ordering::SeqCst);
            actuator.send_close()?;
            self.open.store(false, Ordering::SeqCst);
        }
        info!("Door locked");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> LockStatus {
        let auto_close_pending = lock_unpoisoned(&self.auto_close)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished());

        LockStatus {
            port: lock_unpoisoned(&self.actuator).port_name().to_string(),
            is_open: self.is_open(),
            auto_close_pending,
        }
    }
}

impl<A: LockActuator + 'static> Drop for DoorLock<A> {
    fn drop(&mut self) {
        if let Some(timer) = lock_unpoisoned(&self.auto_close).take() {
            timer.abort();
        }
    }
}
