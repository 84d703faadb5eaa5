//! The monitoring engine: one entry in, a tip and a reconciled risk state out.

use crate::area::{AreaCache, EmotionCatalog};
use crate::classifier::{classify, RiskCandidate};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::state_machine::{reconcile, ReconcileOutcome};
use crate::streak::compute_streak;
use crate::tip::decide_tip;
use chrono::Utc;
use mood_ledger::{RiskHistoryLedger, Transition};
use mood_storage::{HistoryQuery, MonitorStorage, ReconciliationStore, RiskStateStore, TimelineReader};
use mood_types::{
    ClassifiedEntry, HistoryRecordId, ResolutionInfo, RiskHint, RiskHistoryRecord, RiskLevel,
    RiskState, SubjectId, SupervisorId, TimelineEntry, TipDecision,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Risk side of an analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskOutcome {
    /// What the classifier proposed, before sticky-danger arbitration.
    pub candidate: RiskCandidate,
    pub outcome: ReconcileOutcome,
    pub previous_level: RiskLevel,
    /// State as committed, or the unchanged state for a stale entry.
    pub state: RiskState,
    pub record: Option<RiskHistoryRecord>,
}

impl RiskOutcome {
    pub fn transitioned(&self) -> bool {
        self.outcome == ReconcileOutcome::Transitioned
    }

    pub fn is_stale(&self) -> bool {
        self.outcome == ReconcileOutcome::Stale
    }
}

/// Both sides of the analysis of one entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAnalysis {
    pub tip: TipDecision,
    pub risk: RiskOutcome,
}

/// Pattern and risk monitor over classified journal entries.
///
/// Calls for different subjects are independent. Calls for the same subject
/// must be serialised by the caller; out-of-order arrivals are absorbed by
/// the ordering guard.
pub struct MonitoringEngine {
    config: MonitorConfig,
    storage: Arc<dyn MonitorStorage>,
    ledger: RiskHistoryLedger,
    areas: AreaCache,
}

impl MonitoringEngine {
    pub fn new(
        config: MonitorConfig,
        storage: Arc<dyn MonitorStorage>,
        catalog: Arc<dyn EmotionCatalog>,
    ) -> MonitorResult<Self> {
        config.validate()?;
        let areas = AreaCache::new(catalog, config.area_cache.ttl());
        Ok(Self {
            ledger: RiskHistoryLedger::with_storage(Arc::clone(&storage)),
            config,
            storage,
            areas,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RiskHistoryLedger {
        &self.ledger
    }

    /// The emotion lookup cache, for its owner's invalidation hooks.
    pub fn areas(&self) -> &AreaCache {
        &self.areas
    }

    /// Start tracking a subject. Registering twice returns the existing state.
    pub async fn register_subject(&self, subject_id: &SubjectId) -> MonitorResult<RiskState> {
        let state = self.storage.register_subject(subject_id).await?;
        debug!(subject_id = %subject_id, level = %state.level, "Subject registered");
        Ok(state)
    }

    /// Up to `max_count` entries ending at `entry`, newest-first, with areas
    /// resolved. The analysed entry always heads the window.
    pub async fn timeline_window(
        &self,
        entry: &ClassifiedEntry,
        max_count: usize,
    ) -> MonitorResult<Vec<TimelineEntry>> {
        let recent = self
            .storage
            .recent_classified_entries(&entry.subject_id, entry.entry_date, max_count)
            .await?;

        let mut window = Vec::with_capacity(max_count);
        window.push(self.resolve(entry));
        window.extend(
            recent
                .iter()
                .filter(|e| e.entry_id != entry.entry_id)
                .map(|e| self.resolve(e)),
        );
        window.truncate(max_count);
        Ok(window)
    }

    /// Self-care tip for the author of `entry`.
    pub async fn decide_tip(&self, entry: &ClassifiedEntry) -> MonitorResult<TipDecision> {
        let window = self
            .timeline_window(entry, self.config.tip.window_days)
            .await?;
        Ok(decide_tip(&window, &self.config.tip))
    }

    /// Run classifier, state machine and ledger for `entry`.
    ///
    /// The state update and the history record commit together. On a
    /// persistence failure neither is visible.
    pub async fn assess_risk(
        &self,
        entry: &ClassifiedEntry,
        hint: Option<&RiskHint>,
    ) -> MonitorResult<RiskOutcome> {
        let current = self.risk_state(&entry.subject_id).await?;

        let window = self
            .timeline_window(entry, self.config.risk.window_days)
            .await?;
        let streak = compute_streak(&window);
        let candidate = classify(
            &streak,
            hint.and_then(|h| h.level),
            hint.and_then(|h| h.reason.as_deref()),
            &self.config.risk,
        );

        let reconciliation = reconcile(
            &current,
            candidate.clone(),
            &streak,
            entry.entry_date,
            &entry.entry_id,
            Utc::now().date_naive(),
        );

        let record = match reconciliation.outcome {
            ReconcileOutcome::Stale => None,
            ReconcileOutcome::Refreshed => {
                self.storage
                    .commit_reconciliation(reconciliation.new_state.clone(), None)
                    .await
                    .map_err(|err| {
                        warn!(
                            subject_id = %entry.subject_id,
                            error = %err,
                            retryable = err.is_transient(),
                            "Risk state refresh failed"
                        );
                        MonitorError::from(err)
                    })?;
                None
            }
            ReconcileOutcome::Transitioned => {
                let transition = Transition {
                    subject_id: entry.subject_id.clone(),
                    previous_level: reconciliation.previous_level,
                    new_level: reconciliation.new_state.level,
                    streak,
                    reason: reconciliation.effective.reason.clone(),
                    keyword_evidence: hint.map(|h| h.keyword_evidence.clone()).unwrap_or_default(),
                    target_entry_date: entry.entry_date,
                    target_entry_id: entry.entry_id.clone(),
                };
                let record = self
                    .ledger
                    .record(reconciliation.new_state.clone(), transition)
                    .await
                    .map_err(|err| {
                        warn!(subject_id = %entry.subject_id, error = %err, "Risk transition not committed");
                        MonitorError::from(err)
                    })?;
                Some(record)
            }
        };

        Ok(RiskOutcome {
            candidate,
            outcome: reconciliation.outcome,
            previous_level: reconciliation.previous_level,
            state: reconciliation.new_state,
            record,
        })
    }

    /// Tip and risk assessment for one freshly classified entry.
    pub async fn analyze_entry(
        &self,
        entry: &ClassifiedEntry,
        hint: Option<&RiskHint>,
    ) -> MonitorResult<EntryAnalysis> {
        let tip = self.decide_tip(entry).await?;
        let risk = self.assess_risk(entry, hint).await?;
        Ok(EntryAnalysis { tip, risk })
    }

    /// Record a supervisor resolution so a sticky danger may clear on the
    /// next reconciliation. No history record is written here. Repeated
    /// calls keep the first resolution.
    pub async fn resolve_danger(
        &self,
        subject_id: &SubjectId,
        supervisor_id: &SupervisorId,
        memo: impl Into<String>,
    ) -> MonitorResult<RiskState> {
        let mut state = self.risk_state(subject_id).await?;
        if state.level != RiskLevel::Danger {
            return Err(MonitorError::NotInDanger(subject_id.clone()));
        }
        if state.resolution.is_some() {
            debug!(subject_id = %subject_id, "Danger already resolved");
            return Ok(state);
        }

        state.resolution = Some(ResolutionInfo {
            resolved_by: supervisor_id.clone(),
            resolved_at: Utc::now(),
            memo: memo.into(),
        });
        self.storage.put_risk_state(state.clone()).await?;

        info!(
            subject_id = %subject_id,
            supervisor_id = %supervisor_id,
            "Danger resolved by supervisor"
        );
        Ok(state)
    }

    /// Supervisor confirmation of a history record.
    pub async fn confirm(
        &self,
        record_id: &HistoryRecordId,
        supervisor_id: &SupervisorId,
        memo: Option<String>,
    ) -> MonitorResult<RiskHistoryRecord> {
        Ok(self.ledger.confirm(record_id, supervisor_id, memo).await?)
    }

    pub async fn risk_state(&self, subject_id: &SubjectId) -> MonitorResult<RiskState> {
        self.storage
            .get_risk_state(subject_id)
            .await?
            .ok_or_else(|| MonitorError::NotFound(format!("subject {subject_id}")))
    }

    /// Subjects at or above `min_level`.
    pub async fn flagged_subjects(&self, min_level: RiskLevel) -> MonitorResult<Vec<RiskState>> {
        Ok(self.storage.list_risk_states(min_level).await?)
    }

    pub async fn history(&self, query: HistoryQuery) -> MonitorResult<Vec<RiskHistoryRecord>> {
        Ok(self.ledger.query(query).await?)
    }

    fn resolve(&self, entry: &ClassifiedEntry) -> TimelineEntry {
        TimelineEntry::new(
            entry.entry_id.clone(),
            entry.entry_date,
            self.areas.area_for(&entry.emotion_code),
        )
    }
}
