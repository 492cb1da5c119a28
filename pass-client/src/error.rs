//! Client-side error type

use thiserror::Error;

use shared::constants::ENV_CALLER;

/// Errors returned by [`crate::PassClient`]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The service answered with an error body
    #[error("{code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response from service: {0}")]
    InvalidResponse(String),

    #[error("No caller identity configured; pass --caller or set {}", ENV_CALLER)]
    MissingCaller,
}

impl ClientError {
    /// Stable service error code, if the service produced one
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Result type alias for client calls
pub type ClientResult<T> = Result<T, ClientError>;
