//! Network error types.

use thiserror::Error;

/// Network errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed by the remote side.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Handshake failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid message.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Message too large.
    #[error("Message too large: {size} bytes, max {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Network magic mismatch.
    #[error("Network magic mismatch: expected {expected}, got {got}")]
    MagicMismatch { expected: String, got: String },

    /// Payload checksum mismatch.
    #[error("Checksum mismatch for '{command}'")]
    ChecksumMismatch { command: String },

    /// Address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Host kind that cannot be dialed directly.
    #[error("Unreachable host: {0}")]
    Unreachable(String),

    /// DNS resolution failed.
    #[error("DNS resolution failed for {host}: {reason}")]
    Resolution { host: String, reason: String },

    /// Timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    /// Whether the error came from the remote side speaking the protocol badly,
    /// as opposed to the network being unavailable.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NetworkError::InvalidMessage(_)
                | NetworkError::MessageTooLarge { .. }
                | NetworkError::MagicMismatch { .. }
                | NetworkError::ChecksumMismatch { .. }
        )
    }
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
