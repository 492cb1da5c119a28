//! # Device Pass Client
//!
//! Typed HTTP client for the device pass service, plus the `pass-client`
//! command-line tool built on it.

pub mod client;
pub mod error;

pub use client::PassClient;
pub use error::{ClientError, ClientResult};
