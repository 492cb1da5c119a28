//! # Shared Module for the Device Pass Ledger
//!
//! Common types, errors and configuration used by the pass service and the
//! command-line client.
//!
//! ## Model
//!
//! - **Devices** are registered by an owner identity and stay bound to it.
//! - **Access passes** are time-boxed grants from an owner to one viewer.
//! - **Events** are the append-only audit trail of every state change.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::*;
pub use constants::*;
pub use error::*;
pub use types::*;

/// Version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
