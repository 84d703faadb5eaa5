//! Mood Ledger - append-only audit trail of risk level transitions.
//!
//! Every escalation or de-escalation the monitor decides on lands here as a
//! [`RiskHistoryRecord`]. Records are written together with the reconciled
//! risk state through `mood-storage`, so the trail and the state never drift
//! apart. After creation a record only accepts a confirmation, either from a
//! supervisor or, for automatic recoveries, from the system itself.

#![deny(unsafe_code)]

use chrono::{NaiveDate, Utc};
use mood_storage::memory::InMemoryMonitorStorage;
use mood_storage::{
    compute_history_hash, ConfirmationUpdate, HistoryAppend, HistoryQuery, MonitorStorage,
    ReconciliationStore, RiskHistoryStore, StorageError,
};
use mood_types::{
    CauseTag, ConfirmedBy, EntryId, HistoryRecordId, RiskHistoryRecord, RiskLevel, RiskState,
    StreakResult, SubjectId, SupervisorId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reason stored on automatic recoveries that carry none of their own.
pub const AUTO_RESOLVED_REASON: &str = "automatically resolved";

/// A level change reported by the risk state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub subject_id: SubjectId,
    pub previous_level: RiskLevel,
    pub new_level: RiskLevel,
    pub streak: StreakResult,
    pub reason: Option<String>,
    #[serde(default)]
    pub keyword_evidence: Vec<String>,
    pub target_entry_date: NaiveDate,
    pub target_entry_id: EntryId,
}

/// Classify why a transition happened.
pub fn derive_cause(new_level: RiskLevel, keyword_evidence: &[String]) -> CauseTag {
    if !keyword_evidence.is_empty() {
        return CauseTag::KeywordDetected;
    }
    match new_level {
        RiskLevel::Danger => CauseTag::ContinuousExtremeArea,
        RiskLevel::Caution => CauseTag::ContinuousSameArea,
        RiskLevel::Normal => CauseTag::Resolved,
    }
}

/// Build the history payload for a transition, applying system
/// self-confirmation to automatic recoveries.
pub fn draft_record(transition: Transition) -> HistoryAppend {
    let cause = derive_cause(transition.new_level, &transition.keyword_evidence);
    let auto_resolved = cause == CauseTag::Resolved
        && matches!(
            transition.previous_level,
            RiskLevel::Caution | RiskLevel::Danger
        )
        && transition.new_level == RiskLevel::Normal;
    let now = Utc::now();

    let reason = if auto_resolved {
        match transition.reason {
            Some(reason) if !reason.trim().is_empty() => Some(reason),
            _ => Some(AUTO_RESOLVED_REASON.to_string()),
        }
    } else {
        transition.reason
    };

    HistoryAppend {
        id: HistoryRecordId::generate(),
        subject_id: transition.subject_id,
        previous_level: transition.previous_level,
        new_level: transition.new_level,
        cause,
        reason,
        streak_area: transition.streak.area,
        streak_length: transition.streak.length,
        keyword_evidence: transition.keyword_evidence,
        target_entry_date: transition.target_entry_date,
        target_entry_id: transition.target_entry_id,
        confirmed: auto_resolved,
        confirmed_by: auto_resolved.then_some(ConfirmedBy::System),
        confirmed_at: auto_resolved.then_some(now),
        created_at: now,
    }
}

/// The risk history ledger facade.
///
/// Internally this wraps a `MonitorStorage` backend so the monitor and the
/// supervisor-facing views read and write the same records.
pub struct RiskHistoryLedger {
    storage: Arc<dyn MonitorStorage>,
}

impl RiskHistoryLedger {
    /// Create a new ledger backed by in-memory storage.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(InMemoryMonitorStorage::new()),
        }
    }

    /// Create a ledger backed by an explicit storage adapter.
    pub fn with_storage(storage: Arc<dyn MonitorStorage>) -> Self {
        Self { storage }
    }

    /// Access the underlying storage backend.
    pub fn storage(&self) -> Arc<dyn MonitorStorage> {
        Arc::clone(&self.storage)
    }

    /// Record a transition together with the state it produced.
    ///
    /// The state update and the history insert commit as one unit; on error
    /// neither is visible.
    pub async fn record(
        &self,
        new_state: RiskState,
        transition: Transition,
    ) -> Result<RiskHistoryRecord, LedgerError> {
        if new_state.subject_id != transition.subject_id || new_state.level != transition.new_level
        {
            return Err(LedgerError::InvalidTransition(format!(
                "state {}/{} does not match transition {}/{}",
                new_state.subject_id, new_state.level, transition.subject_id, transition.new_level
            )));
        }
        if transition.previous_level == transition.new_level {
            return Err(LedgerError::InvalidTransition(format!(
                "no level change for subject {} ({})",
                transition.subject_id, transition.new_level
            )));
        }

        let draft = draft_record(transition);
        let record = self
            .storage
            .commit_reconciliation(new_state, Some(draft))
            .await
            .map_err(LedgerError::from)?
            .ok_or_else(|| LedgerError::Persistence("history append was dropped".to_string()))?;

        info!(
            subject_id = %record.subject_id,
            record_id = %record.id,
            from = %record.previous_level,
            to = %record.new_level,
            cause = %record.cause,
            auto_confirmed = record.confirmed,
            "Risk transition recorded"
        );
        Ok(record)
    }

    /// Attach a supervisor confirmation. Confirming an already confirmed
    /// record returns it unchanged.
    pub async fn confirm(
        &self,
        record_id: &HistoryRecordId,
        supervisor_id: &SupervisorId,
        memo: Option<String>,
    ) -> Result<RiskHistoryRecord, LedgerError> {
        let current = self
            .storage
            .get_history(record_id)
            .await
            .map_err(LedgerError::from)?
            .ok_or_else(|| LedgerError::NotFound(record_id.0.clone()))?;

        if current.confirmed {
            debug!(record_id = %record_id, "History record already confirmed");
            return Ok(current);
        }

        let update = ConfirmationUpdate {
            confirmed_by: ConfirmedBy::Supervisor(supervisor_id.clone()),
            confirmed_at: Utc::now(),
            memo: memo.filter(|m| !m.trim().is_empty()),
        };
        match self.storage.confirm_history(record_id, update).await {
            Ok(record) => {
                info!(
                    record_id = %record_id,
                    supervisor_id = %supervisor_id,
                    "History record confirmed"
                );
                Ok(record)
            }
            // Lost a race with another confirmation; report the winner.
            Err(StorageError::Conflict(_)) => self
                .get(record_id)
                .await?
                .ok_or_else(|| LedgerError::NotFound(record_id.0.clone())),
            Err(err) => Err(LedgerError::from(err)),
        }
    }

    /// Get one record by id.
    pub async fn get(
        &self,
        record_id: &HistoryRecordId,
    ) -> Result<Option<RiskHistoryRecord>, LedgerError> {
        self.storage
            .get_history(record_id)
            .await
            .map_err(LedgerError::from)
    }

    /// Query records with filters, newest-first.
    pub async fn query(&self, query: HistoryQuery) -> Result<Vec<RiskHistoryRecord>, LedgerError> {
        self.storage
            .list_history(&query)
            .await
            .map_err(LedgerError::from)
    }

    /// Get all records for a subject, newest-first.
    pub async fn by_subject(
        &self,
        subject_id: &SubjectId,
    ) -> Result<Vec<RiskHistoryRecord>, LedgerError> {
        self.query(HistoryQuery::for_subject(subject_id.clone()))
            .await
    }

    /// Records still awaiting a supervisor, optionally for one subject.
    pub async fn pending_confirmations(
        &self,
        subject_id: Option<&SubjectId>,
    ) -> Result<Vec<RiskHistoryRecord>, LedgerError> {
        self.query(HistoryQuery {
            subject_id: subject_id.cloned(),
            ..HistoryQuery::unconfirmed()
        })
        .await
    }

    /// Get statistics about the ledger.
    pub async fn statistics(&self) -> Result<LedgerStatistics, LedgerError> {
        let records = self.query(HistoryQuery::default()).await?;

        let mut stats = LedgerStatistics {
            total_records: records.len(),
            ..Default::default()
        };
        for record in records {
            *stats
                .by_cause
                .entry(record.cause.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_new_level
                .entry(record.new_level.as_str().to_string())
                .or_insert(0) += 1;
            match record.confirmed_by {
                Some(ConfirmedBy::System) => stats.auto_confirmed += 1,
                Some(ConfirmedBy::Supervisor(_)) => stats.supervisor_confirmed += 1,
                None => stats.pending += 1,
            }
        }
        Ok(stats)
    }

    /// Walk the hash chain and report the first record that does not match.
    pub async fn verify_chain(&self) -> Result<ChainVerification, LedgerError> {
        let chain = self
            .storage
            .history_chain()
            .await
            .map_err(LedgerError::from)?;

        let mut previous_hash: Option<String> = None;
        for (index, record) in chain.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            let expected_hash = compute_history_hash(
                &HistoryAppend::from(record),
                previous_hash.as_deref(),
                expected_sequence,
            )
            .map_err(LedgerError::from)?;

            if record.sequence != expected_sequence
                || record.previous_hash != previous_hash
                || record.hash != expected_hash
            {
                warn!(
                    sequence = record.sequence,
                    record_id = %record.id,
                    "Risk history chain broken"
                );
                return Ok(ChainVerification {
                    records_checked: index + 1,
                    first_broken_sequence: Some(record.sequence),
                });
            }
            previous_hash = Some(record.hash.clone());
        }

        Ok(ChainVerification {
            records_checked: chain.len(),
            first_broken_sequence: None,
        })
    }
}

impl Default for RiskHistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_records: usize,
    pub by_cause: HashMap<String, usize>,
    pub by_new_level: HashMap<String, usize>,
    pub auto_confirmed: usize,
    pub supervisor_confirmed: usize,
    pub pending: usize,
}

/// Outcome of a hash chain walk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub records_checked: usize,
    pub first_broken_sequence: Option<u64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken_sequence.is_none()
    }
}

/// Ledger-related errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Immutability violation: {0}")]
    ImmutabilityViolation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::ImmutabilityViolation(msg),
            StorageError::InvalidInput(msg) => Self::InvalidTransition(msg),
            StorageError::Serialization(msg) | StorageError::Backend(msg) => {
                Self::Persistence(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mood_storage::RiskStateStore;
    use mood_types::Area;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn transition(
        subject: &str,
        previous_level: RiskLevel,
        new_level: RiskLevel,
        keywords: Vec<&str>,
    ) -> Transition {
        Transition {
            subject_id: SubjectId::new(subject),
            previous_level,
            new_level,
            streak: StreakResult {
                area: Some(Area::Red),
                length: 7,
            },
            reason: None,
            keyword_evidence: keywords.into_iter().map(String::from).collect(),
            target_entry_date: day(7),
            target_entry_id: EntryId::new("e-7"),
        }
    }

    fn state(subject: &str, level: RiskLevel) -> RiskState {
        let mut state = RiskState::new(SubjectId::new(subject));
        state.level = level;
        state
    }

    async fn registered_ledger(subject: &str) -> RiskHistoryLedger {
        let ledger = RiskHistoryLedger::new();
        ledger
            .storage()
            .register_subject(&SubjectId::new(subject))
            .await
            .expect("register");
        ledger
    }

    #[test]
    fn cause_tags_follow_precedence() {
        let keywords = vec!["hopeless".to_string()];
        assert_eq!(
            derive_cause(RiskLevel::Normal, &keywords),
            CauseTag::KeywordDetected
        );
        assert_eq!(
            derive_cause(RiskLevel::Danger, &[]),
            CauseTag::ContinuousExtremeArea
        );
        assert_eq!(
            derive_cause(RiskLevel::Caution, &[]),
            CauseTag::ContinuousSameArea
        );
        assert_eq!(derive_cause(RiskLevel::Normal, &[]), CauseTag::Resolved);
    }

    #[test]
    fn recovery_is_self_confirmed_with_default_reason() {
        let draft = draft_record(transition(
            "s-1",
            RiskLevel::Caution,
            RiskLevel::Normal,
            vec![],
        ));
        assert_eq!(draft.cause, CauseTag::Resolved);
        assert!(draft.confirmed);
        assert_eq!(draft.confirmed_by, Some(ConfirmedBy::System));
        assert!(draft.confirmed_at.is_some());
        assert_eq!(draft.reason.as_deref(), Some(AUTO_RESOLVED_REASON));
    }

    #[test]
    fn escalations_await_a_supervisor() {
        let draft = draft_record(transition(
            "s-1",
            RiskLevel::Normal,
            RiskLevel::Danger,
            vec![],
        ));
        assert_eq!(draft.cause, CauseTag::ContinuousExtremeArea);
        assert!(!draft.confirmed);
        assert!(draft.confirmed_by.is_none());
    }

    #[tokio::test]
    async fn record_persists_state_and_history_together() {
        let ledger = registered_ledger("s-1").await;
        let record = ledger
            .record(
                state("s-1", RiskLevel::Danger),
                transition("s-1", RiskLevel::Normal, RiskLevel::Danger, vec![]),
            )
            .await
            .unwrap();

        let stored_state = ledger
            .storage()
            .get_risk_state(&SubjectId::new("s-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored_state.level, RiskLevel::Danger);
        assert_eq!(ledger.get(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn record_rejects_non_transitions() {
        let ledger = registered_ledger("s-1").await;
        let result = ledger
            .record(
                state("s-1", RiskLevel::Caution),
                transition("s-1", RiskLevel::Caution, RiskLevel::Caution, vec![]),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidTransition(_))));
        assert!(ledger.by_subject(&SubjectId::new("s-1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let ledger = registered_ledger("s-1").await;
        let record = ledger
            .record(
                state("s-1", RiskLevel::Danger),
                transition("s-1", RiskLevel::Normal, RiskLevel::Danger, vec!["hurt"]),
            )
            .await
            .unwrap();
        assert_eq!(record.cause, CauseTag::KeywordDetected);

        let first = ledger
            .confirm(&record.id, &SupervisorId::new("t-1"), Some("called home".into()))
            .await
            .unwrap();
        let second = ledger
            .confirm(&record.id, &SupervisorId::new("t-2"), Some("again".into()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            second.confirmed_by,
            Some(ConfirmedBy::Supervisor(SupervisorId::new("t-1")))
        );
        assert_eq!(second.supervisor_memo.as_deref(), Some("called home"));
    }

    #[tokio::test]
    async fn confirm_unknown_record_is_not_found() {
        let ledger = RiskHistoryLedger::new();
        let result = ledger
            .confirm(&HistoryRecordId::generate(), &SupervisorId::new("t-1"), None)
            .await;
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn pending_and_statistics_track_confirmation() {
        let ledger = registered_ledger("s-1").await;
        ledger
            .record(
                state("s-1", RiskLevel::Caution),
                transition("s-1", RiskLevel::Normal, RiskLevel::Caution, vec![]),
            )
            .await
            .unwrap();
        ledger
            .record(
                state("s-1", RiskLevel::Normal),
                transition("s-1", RiskLevel::Caution, RiskLevel::Normal, vec![]),
            )
            .await
            .unwrap();

        let pending = ledger.pending_confirmations(None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].new_level, RiskLevel::Caution);

        let stats = ledger.statistics().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.auto_confirmed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.by_cause.get("RESOLVED"), Some(&1));
        assert_eq!(stats.by_cause.get("CONTINUOUS_SAME_AREA"), Some(&1));
    }

    #[tokio::test]
    async fn chain_survives_confirmation() {
        let ledger = registered_ledger("s-1").await;
        let record = ledger
            .record(
                state("s-1", RiskLevel::Danger),
                transition("s-1", RiskLevel::Normal, RiskLevel::Danger, vec![]),
            )
            .await
            .unwrap();
        ledger
            .confirm(&record.id, &SupervisorId::new("t-1"), None)
            .await
            .unwrap();

        let verification = ledger.verify_chain().await.unwrap();
        assert!(verification.is_intact());
        assert_eq!(verification.records_checked, 1);
    }

    proptest! {
        #[test]
        fn property_only_recoveries_self_confirm(
            previous in 0u8..3,
            next in 0u8..3,
            with_keyword in any::<bool>(),
        ) {
            let level = |n: u8| match n {
                0 => RiskLevel::Normal,
                1 => RiskLevel::Caution,
                _ => RiskLevel::Danger,
            };
            prop_assume!(previous != next);
            let keywords = if with_keyword { vec!["alone"] } else { vec![] };
            let draft = draft_record(transition("p", level(previous), level(next), keywords));

            prop_assert_eq!(draft.confirmed, draft.cause == CauseTag::Resolved);
            if with_keyword {
                prop_assert_eq!(draft.cause, CauseTag::KeywordDetected);
            }
        }
    }
}
