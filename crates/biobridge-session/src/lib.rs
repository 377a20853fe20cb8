//! Session engine for one fingerprint terminal.
//!
//! A [`DeviceSession`] owns the terminal's transport and arbitrates between
//! continuous attendance capture and administrative operations, which the
//! terminal cannot serve at the same time.
//!
//! ```text
//!  callers ──► DeviceSession ──► operation permit ──► OperationGuard
//!                   │                                     │
//!                   │ start/stop                          │ pause / resume
//!                   ▼                                     ▼
//!             capture worker ──► transport mutex ◄── admin operation
//!                   │
//!                   ├─ finger_scanned ───────────► EventBus ──► subscribers
//!                   └─ stream lost ─► supervisor ─► reconnect
//! ```
//!
//! - **State**: [`SessionStateMachine`] tracks the lifecycle and rejects
//!   illegal transitions. `Capturing` and `Administering` exclude each
//!   other.
//! - **Events**: [`EventBus`] fans [`DomainEvent`]s out to bounded
//!   per-subscriber queues and never blocks the publisher.
//! - **Results**: every public operation returns an [`OperationResult`];
//!   transport errors are converted before they reach the caller.
//! - **Commands**: [`dispatch`] maps the JSON [`Command`] envelope onto
//!   session operations.

mod bus;
mod capture;
mod config;
mod dispatch;
mod events;
mod guard;
mod operations;
mod reconnect;
mod result;
mod session;
mod state;

pub use bus::{BusStats, EventBus, SubscriberId, Subscription};
pub use config::SessionConfig;
pub use dispatch::{Command, CommandAction, CommandResponse, dispatch};
pub use events::{DomainEvent, EventKind};
pub use operations::EnrollmentReceipt;
pub use result::{OperationError, OperationResult};
pub use session::{DeviceSession, SessionStatus};
pub use state::{SessionState, SessionStateMachine, StateTransition};
