//! Socket error types

use thiserror::Error;

/// Socket client error type.
///
/// Cloneable so that one failed connection attempt can be reported to every
/// caller waiting on it and to the connection-closed callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// Invalid relay URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Handshake failure, write failure or lost session
    #[error("Network error: {0}")]
    Network(String),

    /// Binary frame could not be inflated
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Relay refused a request (CLOSED or NOTICE tied to the subscription)
    #[error("Relay error: {0}")]
    Relay(String),

    /// Relay did not answer in time
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Incoming message stream closed
    #[error("Incoming message stream closed")]
    Closed,
}

impl SocketError {
    /// Whether this error came from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(self, SocketError::Network(_))
    }
}

impl From<serde_json::Error> for SocketError {
    fn from(err: serde_json::Error) -> Self {
        SocketError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SocketError {
    fn from(err: url::ParseError) -> Self {
        SocketError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SocketError::Network(err.to_string())
    }
}

/// Socket result type
pub type Result<T> = std::result::Result<T, SocketError>;
