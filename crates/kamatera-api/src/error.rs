//! HTTP-level errors and their classification into [`RemoteError`]

use kamatera_cloud::RemoteError;
use thiserror::Error;

/// Body text the control plane returns for an empty server lookup
pub const NO_SERVERS_FOUND: &str = "No servers found";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("error response from Kamatera API ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("invalid response from Kamatera API: {0}")]
    Decode(String),
}

impl ApiError {
    /// Timeouts, connection failures and 5xx responses; 4xx is never retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
            ApiError::Status { status, message } => {
                *status >= 500 && !message.contains(NO_SERVERS_FOUND)
            }
            ApiError::Decode(_) => false,
        }
    }

    /// Map to the error taxonomy of the core crate
    pub fn into_remote(self, endpoint: &str, attempts: u32) -> RemoteError {
        if self.is_retryable() {
            return RemoteError::TransientFailure {
                endpoint: endpoint.to_string(),
                attempts,
                message: self.to_string(),
            };
        }

        match self {
            ApiError::Status { message, .. } if message.contains(NO_SERVERS_FOUND) => {
                RemoteError::NotFound(message)
            }
            ApiError::Status {
                status: 401 | 403,
                message,
            } => RemoteError::Unauthorized(message),
            ApiError::Status {
                status: 404,
                message,
            } => RemoteError::NotFound(message),
            ApiError::Status { status, message } => RemoteError::Rejected { status, message },
            ApiError::Transport(e) => RemoteError::InvalidResponse(e.to_string()),
            ApiError::Decode(message) => RemoteError::InvalidResponse(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
