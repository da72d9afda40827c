//! Database error types.

use thiserror::Error;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database file cannot be opened or created.
    #[error("failed to open database: {0}")]
    Open(String),

    /// A schema migration did not apply.
    #[error("migration failed: {0}")]
    Migration(String),

    /// No row for the requested key.
    #[error("{0}")]
    NotFound(String),

    /// A stored value has an unexpected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<DatabaseError> for harvest_core::HarvestError {
    fn from(err: DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
