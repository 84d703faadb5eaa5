//! PostgreSQL adapter for monitor storage.
//!
//! This adapter is the transactional source-of-truth backend. Records are kept
//! as JSONB documents next to the columns the monitor filters on, and a
//! reconciliation commit runs inside one transaction.

use crate::model::{compute_history_hash, ConfirmationUpdate, HistoryAppend, HistoryQuery};
use crate::traits::{ReconciliationStore, RiskHistoryStore, RiskStateStore, TimelineReader};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use mood_types::{
    ClassifiedEntry, EntryId, HistoryRecordId, RiskHistoryRecord, RiskLevel, RiskState, SubjectId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Row};

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresMonitorStorage {
    pool: PgPool,
}

impl PostgresMonitorStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS mood_journal_entries (
                entry_id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                entry_date DATE NOT NULL,
                emotion_code TEXT NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS mood_journal_entries_subject_date
                ON mood_journal_entries (subject_id, entry_date DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS mood_risk_states (
                subject_id TEXT PRIMARY KEY,
                level_rank SMALLINT NOT NULL,
                state JSONB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS mood_risk_history (
                record_id TEXT PRIMARY KEY,
                sequence BIGINT NOT NULL UNIQUE,
                subject_id TEXT NOT NULL,
                record JSONB NOT NULL,
                hash TEXT NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    /// Insert or replace a classified entry.
    pub async fn upsert_entry(&self, entry: &ClassifiedEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO mood_journal_entries (entry_id, subject_id, entry_date, emotion_code)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entry_id) DO UPDATE
               SET subject_id = EXCLUDED.subject_id,
                   entry_date = EXCLUDED.entry_date,
                   emotion_code = EXCLUDED.emotion_code
            "#,
        )
        .bind(entry.entry_id.0.clone())
        .bind(entry.subject_id.0.clone())
        .bind(entry.entry_date)
        .bind(entry.emotion_code.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TimelineReader for PostgresMonitorStorage {
    async fn recent_classified_entries(
        &self,
        subject_id: &SubjectId,
        anchor_date: NaiveDate,
        max_count: usize,
    ) -> StorageResult<Vec<ClassifiedEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT entry_id, subject_id, entry_date, emotion_code
              FROM mood_journal_entries
             WHERE subject_id = $1
               AND entry_date <= $2
             ORDER BY entry_date DESC, entry_id DESC
             LIMIT $3
            "#,
        )
        .bind(subject_id.0.clone())
        .bind(anchor_date)
        .bind(to_i64(max_count)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(entry_row_to_record).collect()
    }
}

#[async_trait]
impl RiskStateStore for PostgresMonitorStorage {
    async fn register_subject(&self, subject_id: &SubjectId) -> StorageResult<RiskState> {
        let fresh = RiskState::new(subject_id.clone());
        sqlx::query(
            r#"
            INSERT INTO mood_risk_states (subject_id, level_rank, state)
            VALUES ($1, $2, $3)
            ON CONFLICT (subject_id) DO NOTHING
            "#,
        )
        .bind(subject_id.0.clone())
        .bind(level_rank(fresh.level))
        .bind(to_json(&fresh)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        self.get_risk_state(subject_id)
            .await?
            .ok_or_else(|| StorageError::Backend(format!("subject {} vanished", subject_id)))
    }

    async fn get_risk_state(&self, subject_id: &SubjectId) -> StorageResult<Option<RiskState>> {
        let row = sqlx::query("SELECT state FROM mood_risk_states WHERE subject_id = $1")
            .bind(subject_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|row| from_json_column(&row, "state")).transpose()
    }

    async fn put_risk_state(&self, state: RiskState) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE mood_risk_states SET level_rank = $1, state = $2 WHERE subject_id = $3",
        )
        .bind(level_rank(state.level))
        .bind(to_json(&state)?)
        .bind(state.subject_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "subject {} not found",
                state.subject_id
            )));
        }
        Ok(())
    }

    async fn list_risk_states(&self, min_level: RiskLevel) -> StorageResult<Vec<RiskState>> {
        let rows = sqlx::query(
            "SELECT state FROM mood_risk_states WHERE level_rank >= $1 ORDER BY subject_id",
        )
        .bind(level_rank(min_level))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(|row| from_json_column(row, "state")).collect()
    }
}

#[async_trait]
impl RiskHistoryStore for PostgresMonitorStorage {
    async fn get_history(&self, id: &HistoryRecordId) -> StorageResult<Option<RiskHistoryRecord>> {
        let row = sqlx::query("SELECT record FROM mood_risk_history WHERE record_id = $1")
            .bind(id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        row.map(|row| from_json_column(&row, "record")).transpose()
    }

    async fn list_history(&self, query: &HistoryQuery) -> StorageResult<Vec<RiskHistoryRecord>> {
        let rows = match query.subject_id {
            Some(ref subject_id) => sqlx::query(
                "SELECT record FROM mood_risk_history WHERE subject_id = $1 ORDER BY sequence DESC",
            )
            .bind(subject_id.0.clone())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?,
            None => sqlx::query("SELECT record FROM mood_risk_history ORDER BY sequence DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record: RiskHistoryRecord = from_json_column(row, "record")?;
            if query.matches(&record) {
                records.push(record);
            }
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn confirm_history(
        &self,
        id: &HistoryRecordId,
        update: ConfirmationUpdate,
    ) -> StorageResult<RiskHistoryRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query("SELECT record FROM mood_risk_history WHERE record_id = $1 FOR UPDATE")
            .bind(id.0.clone())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("history record {} not found", id)))?;
        let mut record: RiskHistoryRecord = from_json_column(&row, "record")?;

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

        sqlx::query("UPDATE mood_risk_history SET record = $1 WHERE record_id = $2")
            .bind(to_json(&record)?)
            .bind(id.0.clone())
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(record)
    }

    async fn history_chain(&self) -> StorageResult<Vec<RiskHistoryRecord>> {
        let rows = sqlx::query("SELECT record FROM mood_risk_history ORDER BY sequence ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.iter().map(|row| from_json_column(row, "record")).collect()
    }
}

#[async_trait]
impl ReconciliationStore for PostgresMonitorStorage {
    async fn commit_reconciliation(
        &self,
        state: RiskState,
        history: Option<HistoryAppend>,
    ) -> StorageResult<Option<RiskHistoryRecord>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let updated = sqlx::query(
            "UPDATE mood_risk_states SET level_rank = $1, state = $2 WHERE subject_id = $3",
        )
        .bind(level_rank(state.level))
        .bind(to_json(&state)?)
        .bind(state.subject_id.0.clone())
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if updated.rows_affected() == 0 {
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

                sqlx::query("LOCK TABLE mood_risk_history IN EXCLUSIVE MODE")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;

                let last = sqlx::query(
                    "SELECT sequence, hash FROM mood_risk_history ORDER BY sequence DESC LIMIT 1",
                )
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

                let (sequence, previous_hash) = if let Some(row) = last {
                    let seq: i64 = row
                        .try_get("sequence")
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                    let prev: String = row
                        .try_get("hash")
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                    (seq + 1, Some(prev))
                } else {
                    (1_i64, None)
                };

                let hash = compute_history_hash(&event, previous_hash.as_deref(), sequence as u64)?;
                let record = event.into_record(sequence as u64, previous_hash, hash);

                sqlx::query(
                    r#"
                    INSERT INTO mood_risk_history (record_id, sequence, subject_id, record, hash)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(record.id.0.clone())
                .bind(sequence)
                .bind(record.subject_id.0.clone())
                .bind(to_json(&record)?)
                .bind(record.hash.clone())
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_conflict)?;
                Some(record)
            }
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(record)
    }
}

fn entry_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<ClassifiedEntry> {
    Ok(ClassifiedEntry {
        entry_id: EntryId(
            row.try_get("entry_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        subject_id: SubjectId(
            row.try_get("subject_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        entry_date: row
            .try_get("entry_date")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        emotion_code: row
            .try_get("emotion_code")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn from_json_column<T: serde::de::DeserializeOwned>(
    row: &sqlx::postgres::PgRow,
    column: &str,
) -> StorageResult<T> {
    let value: serde_json::Value = row
        .try_get(column)
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn level_rank(level: RiskLevel) -> i16 {
    match level {
        RiskLevel::Normal => 0,
        RiskLevel::Caution => 1,
        RiskLevel::Danger => 2,
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
