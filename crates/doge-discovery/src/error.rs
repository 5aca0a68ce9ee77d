//! Discovery error types.

use doge_network::NetworkError;
use thiserror::Error;

/// Discovery errors.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Address string could not be parsed.
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    /// Handshake with a specific peer failed.
    #[error("Handshake with {peer} failed: {source}")]
    Handshake {
        peer: String,
        #[source]
        source: NetworkError,
    },

    /// Worker pool has no free slot.
    #[error("Worker pool saturated: {capacity} tasks already pending")]
    PoolSaturated { capacity: usize },

    /// Worker pool or service was shut down.
    #[error("Discovery service is shut down")]
    ShutDown,
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
