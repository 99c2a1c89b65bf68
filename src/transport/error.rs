//! Transport error types

use std::fmt;
use thiserror::Error;

/// HTTP statuses worth another attempt
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Why a connection could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// Host unreachable or no network at all
    Unreachable,
    /// Connection dropped mid-request - retryable
    ConnectionLost,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionFailure::Unreachable => write!(f, "server unreachable"),
            ConnectionFailure::ConnectionLost => write!(f, "connection lost"),
        }
    }
}

/// Outcome classification for a failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: ConnectionFailure },
    #[error("Not authorized")]
    Unauthorized,
    #[error("{message}")]
    ServerError { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Failed to encode request: {0}")]
    EncodingFailed(String),
    /// Request abandoned by the caller; never shown to the user
    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn unreachable() -> Self {
        Self::ConnectionFailed {
            reason: ConnectionFailure::Unreachable,
        }
    }

    pub fn connection_lost() -> Self {
        Self::ConnectionFailed {
            reason: ConnectionFailure::ConnectionLost,
        }
    }

    /// Build a server error, synthesizing a message when the body had none
    pub fn server_error(status: u16, message: Option<String>) -> Self {
        let message = match message {
            Some(m) if !m.trim().is_empty() => m,
            _ => format!("Request failed with status {status}."),
        };
        Self::ServerError { status, message }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::ConnectionFailed { reason } => *reason == ConnectionFailure::ConnectionLost,
            Self::ServerError { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
            Self::Unauthorized
            | Self::InvalidResponse(_)
            | Self::EncodingFailed(_)
            | Self::Cancelled => false,
        }
    }
}
