//! Error types for the history store

use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field was missing or empty.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The row an update or delete targets does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A link points at a session or entry that does not exist.
    #[error("Reference error: {0}")]
    Reference(String),

    /// The row is still linked and the orphan policy forbids deleting it.
    #[error("Still referenced: {0}")]
    Referenced(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;
