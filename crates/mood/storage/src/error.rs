use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by monitor storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Unknown subject or history record.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write-once rule hit (duplicate record id, second confirmation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller handed over data that cannot be stored as given.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Connection, transaction or lock failure. Callers may retry.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn poisoned(table: &str) -> Self {
        Self::Backend(format!("{table} lock poisoned"))
    }

    /// Whether the same call may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
