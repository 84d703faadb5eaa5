//! Reconciliation of a candidate level against a subject's persisted state.

use crate::classifier::RiskCandidate;
use chrono::NaiveDate;
use mood_types::{EntryId, RiskLevel, RiskState, StreakResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What a reconciliation pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The entry is older than the one the state already reflects.
    Stale,
    /// Same level; bookkeeping fields were updated.
    Refreshed,
    /// The level changed.
    Transitioned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub new_state: RiskState,
    pub transitioned: bool,
    pub previous_level: RiskLevel,
    pub outcome: ReconcileOutcome,
    /// Candidate after the sticky-danger override, if it applied.
    pub effective: RiskCandidate,
}

/// Reconcile `candidate` with `current`.
///
/// A stale entry returns `current` untouched. A danger state without a
/// supervisor resolution never leaves danger here. The resolution is
/// cleared once the level leaves danger.
pub fn reconcile(
    current: &RiskState,
    candidate: RiskCandidate,
    streak: &StreakResult,
    target_entry_date: NaiveDate,
    target_entry_id: &EntryId,
    checked_on: NaiveDate,
) -> Reconciliation {
    if let Some(anchor) = current.target_entry_date {
        if target_entry_date < anchor {
            debug!(
                subject_id = %current.subject_id,
                entry_date = %target_entry_date,
                anchor = %anchor,
                "Stale entry ignored"
            );
            return Reconciliation {
                new_state: current.clone(),
                transitioned: false,
                previous_level: current.level,
                outcome: ReconcileOutcome::Stale,
                effective: candidate,
            };
        }
    }

    let mut effective = candidate;
    if current.is_sticky_danger() && effective.level != RiskLevel::Danger {
        warn!(
            subject_id = %current.subject_id,
            candidate = %effective.level,
            "Danger held until a supervisor resolves it"
        );
        effective = RiskCandidate {
            level: RiskLevel::Danger,
            reason: current.reason.clone(),
        };
    }

    let mut new_state = current.clone();
    new_state.reason = effective.reason.clone();
    new_state.streak_area = streak.area;
    new_state.streak_length = streak.length;
    new_state.last_checked_date = Some(checked_on);
    new_state.target_entry_date = Some(target_entry_date);
    new_state.target_entry_id = Some(target_entry_id.clone());

    if effective.level == current.level {
        return Reconciliation {
            new_state,
            transitioned: false,
            previous_level: current.level,
            outcome: ReconcileOutcome::Refreshed,
            effective,
        };
    }

    new_state.level = effective.level;
    if new_state.level != RiskLevel::Danger {
        new_state.resolution = None;
    }

    Reconciliation {
        new_state,
        transitioned: true,
        previous_level: current.level,
        outcome: ReconcileOutcome::Transitioned,
        effective,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mood_types::{Area, ResolutionInfo, SubjectId, SupervisorId};
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn candidate(level: RiskLevel, reason: &str) -> RiskCandidate {
        RiskCandidate {
            level,
            reason: Some(reason.to_string()),
        }
    }

    fn streak(area: Area, length: u32) -> StreakResult {
        StreakResult {
            area: Some(area),
            length,
        }
    }

    fn in_danger() -> RiskState {
        let mut state = RiskState::new(SubjectId::new("s-1"));
        state.level = RiskLevel::Danger;
        state.reason = Some("7-day run of area RED".into());
        state.target_entry_date = Some(day(7));
        state.target_entry_id = Some(EntryId::new("e-7"));
        state
    }

    fn resolution() -> ResolutionInfo {
        ResolutionInfo {
            resolved_by: SupervisorId::new("t-1"),
            resolved_at: Utc::now(),
            memo: "talked with the student".into(),
        }
    }

    #[test]
    fn escalation_from_fresh_state_transitions() {
        let current = RiskState::new(SubjectId::new("s-1"));
        let result = reconcile(
            &current,
            candidate(RiskLevel::Danger, "7-day run of area RED"),
            &streak(Area::Red, 7),
            day(7),
            &EntryId::new("e-7"),
            day(7),
        );

        assert!(result.transitioned);
        assert_eq!(result.outcome, ReconcileOutcome::Transitioned);
        assert_eq!(result.previous_level, RiskLevel::Normal);
        assert_eq!(result.new_state.level, RiskLevel::Danger);
        assert_eq!(result.new_state.streak_length, 7);
        assert_eq!(result.new_state.target_entry_id, Some(EntryId::new("e-7")));
        assert_eq!(result.new_state.last_checked_date, Some(day(7)));
    }

    #[test]
    fn same_level_refreshes_without_transition() {
        let mut current = RiskState::new(SubjectId::new("s-1"));
        current.level = RiskLevel::Caution;
        current.target_entry_date = Some(day(3));

        let result = reconcile(
            &current,
            candidate(RiskLevel::Caution, "8-day run of area GREEN"),
            &streak(Area::Green, 8),
            day(4),
            &EntryId::new("e-4"),
            day(4),
        );
        assert!(!result.transitioned);
        assert_eq!(result.outcome, ReconcileOutcome::Refreshed);
        assert_eq!(result.new_state.streak_length, 8);
        assert_eq!(result.new_state.target_entry_date, Some(day(4)));
        assert_eq!(
            result.new_state.reason.as_deref(),
            Some("8-day run of area GREEN")
        );
    }

    #[test]
    fn older_entry_is_a_no_op_every_time() {
        let current = in_danger();
        for _ in 0..2 {
            let result = reconcile(
                &current,
                RiskCandidate::normal(),
                &StreakResult::empty(),
                day(2),
                &EntryId::new("e-2"),
                day(8),
            );
            assert_eq!(result.outcome, ReconcileOutcome::Stale);
            assert_eq!(result.new_state, current);
        }
    }

    #[test]
    fn same_day_entry_is_not_stale() {
        let current = in_danger();
        let result = reconcile(
            &current,
            candidate(RiskLevel::Danger, "edited"),
            &streak(Area::Red, 7),
            day(7),
            &EntryId::new("e-7b"),
            day(7),
        );
        assert_eq!(result.outcome, ReconcileOutcome::Refreshed);
        assert_eq!(result.new_state.target_entry_id, Some(EntryId::new("e-7b")));
    }

    #[test]
    fn unresolved_danger_sticks_with_previous_reason() {
        let current = in_danger();
        let result = reconcile(
            &current,
            RiskCandidate::normal(),
            &streak(Area::Green, 1),
            day(8),
            &EntryId::new("e-8"),
            day(8),
        );
        assert!(!result.transitioned);
        assert_eq!(result.new_state.level, RiskLevel::Danger);
        assert_eq!(result.new_state.reason, current.reason);
        assert_eq!(result.new_state.streak_area, Some(Area::Green));
        assert_eq!(result.effective.level, RiskLevel::Danger);
    }

    #[test]
    fn resolved_danger_recovers_and_clears_resolution() {
        let mut current = in_danger();
        current.resolution = Some(resolution());

        let result = reconcile(
            &current,
            RiskCandidate::normal(),
            &streak(Area::Green, 1),
            day(8),
            &EntryId::new("e-8"),
            day(8),
        );
        assert!(result.transitioned);
        assert_eq!(result.previous_level, RiskLevel::Danger);
        assert_eq!(result.new_state.level, RiskLevel::Normal);
        assert!(result.new_state.resolution.is_none());
    }

    #[test]
    fn resolution_survives_while_still_in_danger() {
        let mut current = in_danger();
        current.resolution = Some(resolution());

        let result = reconcile(
            &current,
            candidate(RiskLevel::Danger, "still flagged"),
            &streak(Area::Red, 8),
            day(8),
            &EntryId::new("e-8"),
            day(8),
        );
        assert_eq!(result.outcome, ReconcileOutcome::Refreshed);
        assert!(result.new_state.resolution.is_some());
    }

    fn arb_level() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Normal),
            Just(RiskLevel::Caution),
            Just(RiskLevel::Danger),
        ]
    }

    proptest! {
        #[test]
        fn unresolved_danger_never_clears(
            steps in prop::collection::vec((arb_level(), -2i64..3), 1..20)
        ) {
            let mut state = in_danger();
            let mut date = day(7);
            for (i, (level, offset)) in steps.into_iter().enumerate() {
                let entry_date = date + Duration::days(offset);
                let result = reconcile(
                    &state,
                    RiskCandidate { level, reason: None },
                    &StreakResult::empty(),
                    entry_date,
                    &EntryId::new(format!("e-{i}")),
                    entry_date,
                );
                prop_assert_eq!(result.new_state.level, RiskLevel::Danger);
                prop_assert!(!result.transitioned);
                if result.outcome != ReconcileOutcome::Stale {
                    date = entry_date;
                }
                state = result.new_state;
            }
        }
    }
}
