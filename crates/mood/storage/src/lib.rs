//! Storage contracts for the mood monitoring stack.
//!
//! This crate defines what the monitor needs from the outside world:
//! - a read-only timeline of classified journal entries per subject
//! - the per-subject risk state aggregate
//! - an append-only, hash-chained risk history
//!
//! Design stance:
//! - a risk state update and its history record commit as one unit
//!   ([`ReconciliationStore::commit_reconciliation`])
//! - the in-memory adapter is the deterministic reference; Postgres is the
//!   transactional source of truth behind the `postgres` feature

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod model;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{compute_history_hash, ConfirmationUpdate, HistoryAppend, HistoryQuery};
pub use traits::{
    MonitorStorage, ReconciliationStore, RiskHistoryStore, RiskStateStore, TimelineReader,
};
