//! Mood Monitor - emotional pattern and risk monitoring for journal timelines.
//!
//! For every freshly classified journal entry the monitor:
//! - looks at the author's recent same-area streak and decides whether to
//!   show a self-care tip ([`tip`])
//! - combines that streak with the upstream text signal into a candidate
//!   risk level ([`classifier`])
//! - reconciles the candidate with the subject's persisted state, holding
//!   danger until a supervisor resolves it ([`state_machine`])
//! - records every level change in the hash-chained ledger (`mood-ledger`)
//!
//! The pure pieces (streak, tip, classifier, state machine) take no I/O and
//! are usable on their own. [`MonitoringEngine`] wires them to storage.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod area;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod state_machine;
pub mod streak;
pub mod tip;

pub use area::{AreaCache, AreaCacheStats, EmotionCatalog, StaticEmotionCatalog};
pub use classifier::{classify, RiskCandidate};
pub use config::{AreaCacheConfig, MonitorConfig, RiskPolicy, TipPolicy};
pub use engine::{EntryAnalysis, MonitoringEngine, RiskOutcome};
pub use error::{MonitorError, MonitorResult};
pub use state_machine::{reconcile, ReconcileOutcome, Reconciliation};
pub use streak::compute_streak;
pub use tip::decide_tip;

pub use mood_ledger::{ChainVerification, LedgerStatistics, RiskHistoryLedger};
pub use mood_storage::HistoryQuery;
