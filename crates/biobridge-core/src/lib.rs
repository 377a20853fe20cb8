//! Shared vocabulary for the biometric bridge.
//!
//! Holds the error taxonomy, validated identifiers, punch-code mapping,
//! timing constants and the JSON configuration document used by the
//! hardware and session crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::BridgeConfig;
pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
