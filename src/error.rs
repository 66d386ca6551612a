//! Error types for respwire-client.

use thiserror::Error;

/// Main error type for all respwire operations.
#[derive(Debug, Error)]
pub enum RespwireError {
    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not establish the connection (refused, unresolvable, timed out).
    #[error("Connection to {addr} failed: {source}")]
    Connection {
        /// The `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (application payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed stream or unexpected frame shape. Always fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed by the peer or already torn down locally.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound command queue is at capacity.
    #[error("Outbound queue full")]
    QueueFull,

    /// Caller passed an argument the command cannot carry.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid connection configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RespwireError {
    /// Build a protocol error from anything displayable.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        RespwireError::Protocol(msg.into())
    }
}

/// Result type alias using RespwireError.
pub type Result<T> = std::result::Result<T, RespwireError>;
