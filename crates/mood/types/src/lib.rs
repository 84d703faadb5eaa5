//! Mood Types - shared vocabulary for emotional pattern and risk monitoring.
//!
//! Every crate in the monitoring stack speaks in these types: the mood-quadrant
//! [`Area`], the ordered [`RiskLevel`], the per-subject [`RiskState`] aggregate
//! and the append-only [`RiskHistoryRecord`].
#![deny(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// A monitored subject (normally a student).
    SubjectId
);
string_id!(
    /// A journal entry as identified by the surrounding application.
    EntryId
);
string_id!(
    /// A supervising teacher acting on risk state or history.
    SupervisorId
);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryRecordId(pub String);
impl HistoryRecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
impl fmt::Display for HistoryRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected values at the ingress boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("invalid risk level: {0:?}")]
    InvalidRiskLevel(String),

    #[error("invalid area: {0:?}")]
    InvalidArea(String),
}

/// Mood-quadrant category assigned to a classified entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Area {
    Red,
    Yellow,
    Blue,
    Green,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::Red, Area::Yellow, Area::Blue, Area::Green];

    /// Uppercase tag used when building tip codes.
    pub fn code(&self) -> &'static str {
        match self {
            Area::Red => "RED",
            Area::Yellow => "YELLOW",
            Area::Blue => "BLUE",
            Area::Green => "GREEN",
        }
    }

    /// Red and Blue are the extreme quadrants.
    pub fn is_extreme(&self) -> bool {
        matches!(self, Area::Red | Area::Blue)
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Area {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RED" => Ok(Area::Red),
            "YELLOW" => Ok(Area::Yellow),
            "BLUE" => Ok(Area::Blue),
            "GREEN" => Ok(Area::Green),
            _ => Err(TypeError::InvalidArea(s.to_string())),
        }
    }
}

/// Ordered severity of a subject's flagged status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Normal,
    Caution,
    Danger,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Caution => "caution",
            RiskLevel::Danger => "danger",
        }
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Normal
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(RiskLevel::Normal),
            "caution" => Ok(RiskLevel::Caution),
            "danger" => Ok(RiskLevel::Danger),
            _ => Err(TypeError::InvalidRiskLevel(s.to_string())),
        }
    }
}

/// One day of a subject's journal as seen by the monitor.
///
/// `area` is `None` while the entry is still unclassified; such entries
/// break streaks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub entry_id: EntryId,
    pub entry_date: NaiveDate,
    pub area: Option<Area>,
}

impl TimelineEntry {
    pub fn new(entry_id: EntryId, entry_date: NaiveDate, area: Option<Area>) -> Self {
        Self {
            entry_id,
            entry_date,
            area,
        }
    }
}

/// A journal entry whose emotion has been classified upstream.
///
/// The emotion code is resolved to an [`Area`] through the reference catalog
/// before any pattern analysis happens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEntry {
    pub subject_id: SubjectId,
    pub entry_id: EntryId,
    pub entry_date: NaiveDate,
    pub emotion_code: String,
}

/// Longest same-area run of consecutive days ending at the newest entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakResult {
    pub area: Option<Area>,
    pub length: u32,
}

impl StreakResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Explicit supervisor sign-off that unlocks a sticky danger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionInfo {
    pub resolved_by: SupervisorId,
    pub resolved_at: DateTime<Utc>,
    pub memo: String,
}

/// Risk-related sub-aggregate of a subject. One instance per subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskState {
    pub subject_id: SubjectId,
    pub level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_area: Option<Area>,
    pub streak_length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_date: Option<NaiveDate>,
    /// Newest entry this state reflects; older entries are rejected against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_entry_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_entry_id: Option<EntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionInfo>,
}

impl RiskState {
    /// State of a subject that has never been analysed.
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            level: RiskLevel::Normal,
            reason: None,
            streak_area: None,
            streak_length: 0,
            last_checked_date: None,
            target_entry_date: None,
            target_entry_id: None,
            resolution: None,
        }
    }

    /// Danger that only a supervisor resolution can clear.
    pub fn is_sticky_danger(&self) -> bool {
        self.level == RiskLevel::Danger && self.resolution.is_none()
    }
}

/// Why a transition was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CauseTag {
    KeywordDetected,
    ContinuousExtremeArea,
    ContinuousSameArea,
    Resolved,
}

impl CauseTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseTag::KeywordDetected => "KEYWORD_DETECTED",
            CauseTag::ContinuousExtremeArea => "CONTINUOUS_EXTREME_AREA",
            CauseTag::ContinuousSameArea => "CONTINUOUS_SAME_AREA",
            CauseTag::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for CauseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who confirmed a history record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConfirmedBy {
    System,
    Supervisor(SupervisorId),
}

impl fmt::Display for ConfirmedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmedBy::System => f.write_str("SYSTEM"),
            ConfirmedBy::Supervisor(id) => write!(f, "{}", id),
        }
    }
}

/// Audit entry for one risk-level transition.
///
/// Only the confirmation fields (`confirmed`, `confirmed_by`, `confirmed_at`,
/// `supervisor_memo`) change after creation. `sequence`, `previous_hash` and
/// `hash` are assigned by storage and chain the immutable fields together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskHistoryRecord {
    pub id: HistoryRecordId,
    pub subject_id: SubjectId,
    pub previous_level: RiskLevel,
    pub new_level: RiskLevel,
    pub cause: CauseTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streak_area: Option<Area>,
    pub streak_length: u32,
    #[serde(default)]
    pub keyword_evidence: Vec<String>,
    pub target_entry_date: NaiveDate,
    pub target_entry_id: EntryId,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<ConfirmedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_memo: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(default)]
    pub hash: String,
}

/// Self-care tip recommendation for an entry's author. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipDecision {
    pub show: bool,
    pub area: Option<Area>,
    pub consecutive_days: Option<u32>,
    pub tip_code: Option<String>,
}

impl TipDecision {
    pub fn hidden() -> Self {
        Self::default()
    }
}

/// Per-entry risk signal produced by the upstream text classifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskHint {
    pub level: Option<RiskLevel>,
    pub reason: Option<String>,
    #[serde(default)]
    pub keyword_evidence: Vec<String>,
}

impl RiskHint {
    /// Validate a raw hint. A blank level is treated as absent; anything else
    /// must name a known risk level.
    pub fn parse(
        level: Option<&str>,
        reason: Option<String>,
        keyword_evidence: Vec<String>,
    ) -> Result<Self, TypeError> {
        let level = match level.map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<RiskLevel>()?),
        };
        Ok(Self {
            level,
            reason: reason.filter(|r| !r.trim().is_empty()),
            keyword_evidence: keyword_evidence
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }
}
