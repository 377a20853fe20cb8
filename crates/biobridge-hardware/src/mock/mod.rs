//! In-memory devices for development and testing.
//!
//! [`MockTransport`] simulates a fingerprint terminal: it keeps a user
//! table, records every command it receives, enforces the live-stream
//! busy rule and can be scripted to fail. [`MemoryPort`] stands in for the
//! lock controller's serial line.

mod port;
mod transport;

pub use port::MemoryPort;
pub use transport::{CallKind, MockFault, MockTransport, MockTransportHandle, TransportCall};
