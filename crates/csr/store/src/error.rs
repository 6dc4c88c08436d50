//! Storage errors

use thiserror::Error;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists, unique constraint)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            if db.is_unique_violation() {
                return StorageError::Conflict(db.message().to_string());
            }
        }
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(e.to_string())
            }
            other => StorageError::Query(other.to_string()),
        }
    }
}
