//! Candidate risk level from a streak and the upstream text signal.

use crate::config::RiskPolicy;
use mood_types::{Area, RiskLevel, StreakResult};
use serde::{Deserialize, Serialize};

/// Level the pipeline proposes before the state machine arbitrates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCandidate {
    pub level: RiskLevel,
    pub reason: Option<String>,
}

impl RiskCandidate {
    pub fn normal() -> Self {
        Self {
            level: RiskLevel::Normal,
            reason: None,
        }
    }
}

/// Combine a streak with the text classifier's level and reason.
///
/// First match wins:
/// 1. text says danger
/// 2. long extreme-area streak (danger)
/// 3. long non-extreme streak (caution)
/// 4. text says caution
/// 5. normal
pub fn classify(
    streak: &StreakResult,
    llm_level: Option<RiskLevel>,
    llm_reason: Option<&str>,
    policy: &RiskPolicy,
) -> RiskCandidate {
    let llm_reason = llm_reason.map(str::trim).filter(|r| !r.is_empty());

    if llm_level == Some(RiskLevel::Danger) {
        return RiskCandidate {
            level: RiskLevel::Danger,
            reason: llm_reason.map(str::to_string),
        };
    }

    if let Some(area) = streak.area.filter(|_| streak.length >= policy.streak_threshold) {
        let level = if area.is_extreme() {
            RiskLevel::Danger
        } else {
            RiskLevel::Caution
        };
        return RiskCandidate {
            level,
            reason: Some(streak_reason(streak.length, area, llm_reason)),
        };
    }

    if llm_level == Some(RiskLevel::Caution) {
        return RiskCandidate {
            level: RiskLevel::Caution,
            reason: llm_reason.map(str::to_string),
        };
    }

    RiskCandidate::normal()
}

fn streak_reason(length: u32, area: Area, extra: Option<&str>) -> String {
    let mut reason = format!("{length}-day run of area {area}");
    if let Some(extra) = extra {
        reason.push_str("\nadditional: ");
        reason.push_str(extra);
    }
    reason
}
