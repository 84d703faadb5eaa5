//! In-memory reference implementation for the monitor storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend (e.g. PostgreSQL) for source-of-truth data.

use crate::model::{compute_history_hash, ConfirmationUpdate, HistoryAppend, HistoryQuery};
use crate::traits::{ReconciliationStore, RiskHistoryStore, RiskStateStore, TimelineReader};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use mood_types::{
    ClassifiedEntry, HistoryRecordId, RiskHistoryRecord, RiskLevel, RiskState, SubjectId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Risk state and history live behind one lock so a reconciliation commit is
/// a single critical section.
#[derive(Default)]
struct RiskTables {
    states: HashMap<SubjectId, RiskState>,
    history: Vec<RiskHistoryRecord>,
}

/// In-memory monitor storage adapter.
#[derive(Default)]
pub struct InMemoryMonitorStorage {
    entries: RwLock<HashMap<SubjectId, Vec<ClassifiedEntry>>>,
    risk: RwLock<RiskTables>,
}

impl InMemoryMonitorStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a classified entry (keyed by entry id).
    pub fn upsert_entry(&self, entry: ClassifiedEntry) -> StorageResult<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| StorageError::poisoned("timeline"))?;
        let timeline = guard.entry(entry.subject_id.clone()).or_default();
        match timeline.iter_mut().find(|e| e.entry_id == entry.entry_id) {
            Some(existing) => *existing = entry,
            None => timeline.push(entry),
        }
        Ok(())
    }
}

#[async_trait]
impl TimelineReader for InMemoryMonitorStorage {
    async fn recent_classified_entries(
        &self,
        subject_id: &SubjectId,
        anchor_date: NaiveDate,
        max_count: usize,
    ) -> StorageResult<Vec<ClassifiedEntry>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| StorageError::poisoned("timeline"))?;
        let Some(timeline) = guard.get(subject_id) else {
            return Ok(Vec::new());
        };

        let mut window = timeline
            .iter()
            .filter(|entry| entry.entry_date <= anchor_date)
            .cloned()
            .collect::<Vec<_>>();
        window.sort_by(|a, b| {
            b.entry_date
                .cmp(&a.entry_date)
                .then_with(|| b.entry_id.cmp(&a.entry_id))
        });
        window.truncate(max_count);
        Ok(window)
    }
}

#[async_trait]
impl RiskStateStore for InMemoryMonitorStorage {
    async fn register_subject(&self, subject_id: &SubjectId) -> StorageResult<RiskState> {
        let mut guard = self
            .risk
            .write()
            .map_err(|_| StorageError::poisoned("risk"))?;
        let state = guard
            .states
            .entry(subject_id.clone())
            .or_insert_with(|| RiskState::new(subject_id.clone()));
        Ok(state.clone())
    }

    async fn get_risk_state(&self, subject_id: &SubjectId) -> StorageResult<Option<RiskState>> {
        let guard = self
            .risk
            .read()
            .map_err(|_| StorageError::poisoned("risk"))?;
        Ok(guard.states.get(subject_id).cloned())
    }

    async fn put_risk_state(&self, state: RiskState) -> StorageResult<()> {
        let mut guard = self
            .risk
            .write()
            .map_err(|_| StorageError::poisoned("risk"))?;
        let slot = guard.states.get_mut(&state.subject_id).ok_or_else(|| {
            StorageError::NotFound(format!("subject {} not found", state.subject_id))
        })?;
        *slot = state;
        Ok(())
    }

    async fn list_risk_states(&self, min_level: RiskLevel) -> StorageResult<Vec<RiskState>> {
        let guard = self
            .risk
            .read()
            .map_err(|_| StorageError::poisoned("risk"))?;
        let mut values = guard
            .states
            .values()
            .filter(|state| state.level >= min_level)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        Ok(values)
    }
}

#[async_trait]
impl RiskHistoryStore for InMemoryMonitorStorage {
    async fn get_history(&self, id: &HistoryRecordId) -> StorageResult<Option<RiskHistoryRecord>> {
        let guard = self
            .risk
            .read()
            .map_err(|_| StorageError::poisoned("risk"))?;
        Ok(guard.history.iter().find(|r| &r.id == id).cloned())
    }

    async fn list_history(&self, query: &HistoryQuery) -> StorageResult<Vec<RiskHistoryRecord>> {
        let guard = self
            .risk
            .read()
            .map_err(|_| StorageError::poisoned("risk"))?;
        let mut values = guard
            .history
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        if let Some(limit) = query.limit {
            values.truncate(limit);
        }
        Ok(values)
    }

    async fn confirm_history(
        &self,
        id: &HistoryRecordId,
        update: ConfirmationUpdate,
    ) -> StorageResult<RiskHistoryRecord> {
        let mut guard = self
            .risk
            .write()
            .map_err(|_| StorageError::poisoned("risk"))?;
        let record = guard
            .history
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("history record {} not found", id)))?;

        if record.confirmed {
            return Err(StorageError::Conflict(format!(
                "history record {} is already confirmed",
                id
            )));
        }

        record.confirmed = true;
        record.confirmed_by = Some(update.confirmed_by);
        record.confirmed_at = Some(update.confirmed_at);
        record.supervisor_memo = update.memo;
        Ok(record.clone())
    }

    async fn history_chain(&self) -> StorageResult<Vec<RiskHistoryRecord>> {
        let guard = self
            .risk
            .read()
            .map_err(|_| StorageError::poisoned("risk"))?;
        Ok(guard.history.clone())
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryMonitorStorage {
    async fn commit_reconciliation(
        &self,
        state: RiskState,
        history: Option<HistoryAppend>,
    ) -> StorageResult<Option<RiskHistoryRecord>> {
        let mut guard = self
            .risk
            .write()
            .map_err(|_| StorageError::poisoned("risk"))?;

        // Validate everything before the first write.
        if !guard.states.contains_key(&state.subject_id) {
            return Err(StorageError::NotFound(format!(
                "subject {} not found",
                state.subject_id
            )));
        }

        let record = match history {
            Some(event) => {
                if event.subject_id != state.subject_id {
                    return Err(StorageError::InvalidInput(format!(
                        "history record for {} committed with state of {}",
                        event.subject_id, state.subject_id
                    )));
                }
                if guard.history.iter().any(|r| r.id == event.id) {
                    return Err(StorageError::Conflict(format!(
                        "history record {} already exists",
                        event.id
                    )));
                }
                let previous_hash = guard.history.last().map(|r| r.hash.clone());
                let sequence = guard.history.len() as u64 + 1;
                let hash = compute_history_hash(&event, previous_hash.as_deref(), sequence)?;
                Some(event.into_record(sequence, previous_hash, hash))
            }
            None => None,
        };

        if let Some(ref record) = record {
            guard.history.push(record.clone());
        }
        guard.states.insert(state.subject_id.clone(), state);
        Ok(record)
    }
}
