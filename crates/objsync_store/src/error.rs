//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// `NotFound` and `Discarded` are sentinels the notification core matches
/// on: a delete for an unknown object is recovered by recreating the
/// tombstone on edge nodes, and a discarded append is treated as a
/// successful no-op.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object, destination, or record does not exist.
    #[error("not found")]
    NotFound,

    /// The append was rejected because the stored object state is stale
    /// (e.g. superseded by a newer instance).
    #[error("append discarded: stored object state is stale")]
    Discarded,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A backend-specific failure.
    #[error("storage backend error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Creates a backend-specific error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True if this error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    /// True if this error is the discarded-append sentinel.
    pub fn is_discarded(&self) -> bool {
        matches!(self, StoreError::Discarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_classifiers() {
        assert!(StoreError::NotFound.is_not_found());
        assert!(!StoreError::NotFound.is_discarded());
        assert!(StoreError::Discarded.is_discarded());
        assert!(!StoreError::internal("boom").is_not_found());
        assert!(!StoreError::internal("boom").is_discarded());
    }
}
