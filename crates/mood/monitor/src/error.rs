use mood_ledger::LedgerError;
use mood_storage::StorageError;
use mood_types::{SubjectId, TypeError};
use thiserror::Error;

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors surfaced by the monitoring engine.
///
/// Stale (out-of-order) entries and entries without a resolvable area are
/// not errors; they show up in the normal return values.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid risk level: {0:?}")]
    InvalidRiskLevel(String),

    #[error("invalid area: {0:?}")]
    InvalidArea(String),

    #[error("subject {0} is not in danger")]
    NotInDanger(SubjectId),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<TypeError> for MonitorError {
    fn from(value: TypeError) -> Self {
        match value {
            TypeError::InvalidRiskLevel(raw) => Self::InvalidRiskLevel(raw),
            TypeError::InvalidArea(raw) => Self::InvalidArea(raw),
        }
    }
}

impl From<StorageError> for MonitorError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<LedgerError> for MonitorError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(msg) => Self::NotFound(msg),
            other => Self::PersistenceFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_errors_keep_the_raw_value() {
        let err = MonitorError::from(TypeError::InvalidRiskLevel("severe".into()));
        assert!(matches!(err, MonitorError::InvalidRiskLevel(ref raw) if raw == "severe"));
        assert!(err.to_string().contains("severe"));
    }

    #[test]
    fn storage_failures_become_persistence_failures() {
        let err = MonitorError::from(StorageError::Backend("disk full".into()));
        assert!(matches!(err, MonitorError::PersistenceFailure(_)));

        let missing = MonitorError::from(StorageError::NotFound("subject s-9".into()));
        assert!(matches!(missing, MonitorError::NotFound(_)));
    }
}
