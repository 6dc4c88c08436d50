//! Checkpoint service errors

use csr_store::StorageError;
use csr_types::CheckpointNumberError;
use thiserror::Error;

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors returned by [`crate::CheckpointService`]
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Program, sponsor or checkpoint does not exist
    #[error("{0}")]
    NotFound(String),

    /// The actor is not allowed to perform the operation
    #[error("{0}")]
    Forbidden(String),

    /// The checkpoint is not in a state that allows the operation
    #[error("{0}")]
    InvalidTransition(String),

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Coarse classification used by transport adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidTransition,
    Validation,
    Storage,
}

impl CheckpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckpointError::NotFound(_) => ErrorKind::NotFound,
            CheckpointError::Forbidden(_) => ErrorKind::Forbidden,
            CheckpointError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            CheckpointError::Validation(_) => ErrorKind::Validation,
            CheckpointError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<CheckpointNumberError> for CheckpointError {
    fn from(e: CheckpointNumberError) -> Self {
        CheckpointError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csr_types::CheckpointNumber;

    #[test]
    fn test_number_errors_are_validation() {
        let err: CheckpointError = "7".parse::<CheckpointNumber>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: CheckpointError = "abc".parse::<CheckpointNumber>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_storage_errors_convert() {
        let err: CheckpointError = StorageError::Connection("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("refused"));
    }
}
