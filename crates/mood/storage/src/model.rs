use crate::{StorageError, StorageResult};
use chrono::{DateTime, NaiveDate, Utc};
use mood_types::{
    Area, CauseTag, ConfirmedBy, EntryId, HistoryRecordId, RiskHistoryRecord, RiskLevel, SubjectId,
};
use serde::{Deserialize, Serialize};

/// History append payload. Sequencing and hashes are assigned by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAppend {
    pub id: HistoryRecordId,
    pub subject_id: SubjectId,
    pub previous_level: RiskLevel,
    pub new_level: RiskLevel,
    pub cause: CauseTag,
    pub reason: Option<String>,
    pub streak_area: Option<Area>,
    pub streak_length: u32,
    #[serde(default)]
    pub keyword_evidence: Vec<String>,
    pub target_entry_date: NaiveDate,
    pub target_entry_id: EntryId,
    pub confirmed: bool,
    pub confirmed_by: Option<ConfirmedBy>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HistoryAppend {
    /// Seal the payload into a stored record at the given chain position.
    pub fn into_record(
        self,
        sequence: u64,
        previous_hash: Option<String>,
        hash: String,
    ) -> RiskHistoryRecord {
        RiskHistoryRecord {
            id: self.id,
            subject_id: self.subject_id,
            previous_level: self.previous_level,
            new_level: self.new_level,
            cause: self.cause,
            reason: self.reason,
            streak_area: self.streak_area,
            streak_length: self.streak_length,
            keyword_evidence: self.keyword_evidence,
            target_entry_date: self.target_entry_date,
            target_entry_id: self.target_entry_id,
            confirmed: self.confirmed,
            confirmed_by: self.confirmed_by,
            confirmed_at: self.confirmed_at,
            supervisor_memo: None,
            created_at: self.created_at,
            sequence,
            previous_hash,
            hash,
        }
    }
}

/// Confirmation sub-update, the only mutation a history record accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationUpdate {
    pub confirmed_by: ConfirmedBy,
    pub confirmed_at: DateTime<Utc>,
    pub memo: Option<String>,
}

/// Filters for history reads. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub subject_id: Option<SubjectId>,
    pub confirmed: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub entry_date_from: Option<NaiveDate>,
    pub entry_date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn for_subject(subject_id: SubjectId) -> Self {
        Self {
            subject_id: Some(subject_id),
            ..Default::default()
        }
    }

    pub fn unconfirmed() -> Self {
        Self {
            confirmed: Some(false),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &RiskHistoryRecord) -> bool {
        if let Some(ref subject_id) = self.subject_id {
            if record.subject_id != *subject_id {
                return false;
            }
        }
        if let Some(confirmed) = self.confirmed {
            if record.confirmed != confirmed {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at > before {
                return false;
            }
        }
        if let Some(from) = self.entry_date_from {
            if record.target_entry_date < from {
                return false;
            }
        }
        if let Some(to) = self.entry_date_to {
            if record.target_entry_date > to {
                return false;
            }
        }
        true
    }
}

/// Hash of a record's immutable fields, linked to its predecessor.
///
/// Confirmation fields are left out: they are the one sanctioned mutation
/// and must not break the chain.
pub fn compute_history_hash(
    event: &HistoryAppend,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "id": event.id.0,
        "subject_id": event.subject_id.0,
        "previous_level": event.previous_level,
        "new_level": event.new_level,
        "cause": event.cause,
        "reason": event.reason,
        "streak_area": event.streak_area,
        "streak_length": event.streak_length,
        "keyword_evidence": event.keyword_evidence,
        "target_entry_date": event.target_entry_date,
        "target_entry_id": event.target_entry_id.0,
        "created_at": event.created_at,
    });
    let serialized = serde_json::to_vec(&serializable)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

/// Rebuild the append payload from a stored record, for chain verification.
impl From<&RiskHistoryRecord> for HistoryAppend {
    fn from(record: &RiskHistoryRecord) -> Self {
        Self {
            id: record.id.clone(),
            subject_id: record.subject_id.clone(),
            previous_level: record.previous_level,
            new_level: record.new_level,
            cause: record.cause,
            reason: record.reason.clone(),
            streak_area: record.streak_area,
            streak_length: record.streak_length,
            keyword_evidence: record.keyword_evidence.clone(),
            target_entry_date: record.target_entry_date,
            target_entry_id: record.target_entry_id.clone(),
            confirmed: record.confirmed,
            confirmed_by: record.confirmed_by.clone(),
            confirmed_at: record.confirmed_at,
            created_at: record.created_at,
        }
    }
}
