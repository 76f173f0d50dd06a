//! Error types for pushwire-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport-level failure (connect, send or receive).
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error raised by a transport implementation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint URI could not be turned into a connect request.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Malformed or unframeable inbound data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// No matching response arrived before the deadline.
    #[error("Request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The remote side explicitly rejected the request.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The connection dropped while the request was pending.
    #[error("Connection lost")]
    ConnectionLost,

    /// Reconnect attempts ran out; the session is closed.
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The session is closed or closing.
    #[error("Session closed")]
    SessionClosed,

    /// Outbound queue stayed full past the backpressure timeout.
    #[error("Backpressure timeout")]
    Backpressure,

    /// Invalid builder/configuration input.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Whether a failed connect attempt with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_) | SessionError::Io(_))
    }

    /// Whether this error came from a connection reset rather than the remote side.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, SessionError::ConnectionLost | SessionError::SessionClosed)
    }
}

/// Result type alias using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
