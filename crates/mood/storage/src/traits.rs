use crate::model::{ConfirmationUpdate, HistoryAppend, HistoryQuery};
use crate::StorageResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use mood_types::{ClassifiedEntry, HistoryRecordId, RiskHistoryRecord, RiskLevel, RiskState, SubjectId};

/// Read-only window over a subject's classified journal entries.
#[async_trait]
pub trait TimelineReader: Send + Sync {
    /// Up to `max_count` classified entries dated on or before `anchor_date`,
    /// newest-first. The anchor entry itself is included.
    async fn recent_classified_entries(
        &self,
        subject_id: &SubjectId,
        anchor_date: NaiveDate,
        max_count: usize,
    ) -> StorageResult<Vec<ClassifiedEntry>>;
}

/// Storage interface for the per-subject risk state aggregate.
#[async_trait]
pub trait RiskStateStore: Send + Sync {
    /// Create a `Normal` state for the subject. Returns the existing state if
    /// the subject is already registered.
    async fn register_subject(&self, subject_id: &SubjectId) -> StorageResult<RiskState>;

    async fn get_risk_state(&self, subject_id: &SubjectId) -> StorageResult<Option<RiskState>>;

    /// Replace the state of a registered subject without touching history.
    async fn put_risk_state(&self, state: RiskState) -> StorageResult<()>;

    /// States at or above `min_level`, ordered by subject id.
    async fn list_risk_states(&self, min_level: RiskLevel) -> StorageResult<Vec<RiskState>>;
}

/// Storage interface for the append-only risk history.
#[async_trait]
pub trait RiskHistoryStore: Send + Sync {
    async fn get_history(&self, id: &HistoryRecordId) -> StorageResult<Option<RiskHistoryRecord>>;

    /// Records matching the query, newest-first.
    async fn list_history(&self, query: &HistoryQuery) -> StorageResult<Vec<RiskHistoryRecord>>;

    /// Attach a confirmation. Fails with `Conflict` if the record is already
    /// confirmed.
    async fn confirm_history(
        &self,
        id: &HistoryRecordId,
        update: ConfirmationUpdate,
    ) -> StorageResult<RiskHistoryRecord>;

    /// Every record in chain order, oldest first.
    async fn history_chain(&self) -> StorageResult<Vec<RiskHistoryRecord>>;
}

/// The atomic write path of a reconciliation pass.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Persist the reconciled state and, when a transition happened, append
    /// its history record. Either both become visible or neither does.
    async fn commit_reconciliation(
        &self,
        state: RiskState,
        history: Option<HistoryAppend>,
    ) -> StorageResult<Option<RiskHistoryRecord>>;
}

/// Unified storage bundle used by the monitoring engine.
pub trait MonitorStorage:
    TimelineReader + RiskStateStore + RiskHistoryStore + ReconciliationStore + Send + Sync
{
}

impl<T> MonitorStorage for T where
    T: TimelineReader + RiskStateStore + RiskHistoryStore + ReconciliationStore + Send + Sync
{
}
