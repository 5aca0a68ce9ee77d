//! Error types for the peer catalog.

use thiserror::Error;

/// Catalog errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Snapshot could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
