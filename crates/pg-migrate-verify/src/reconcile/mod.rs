//! Bounded-memory reconciliation of two primary-key ordered row streams.
//!
//! - [`Reconciler`]: ingests chunk pairs, matches keys, flushes rows that can
//!   no longer be matched
//! - [`PendingSet`]: per-side rows waiting for a counterpart
//! - [`ErrorLedger`]: corruption, omission, and creation findings

pub mod engine;
pub mod ledger;
pub mod pending;

pub use engine::{ReconcileOutcome, ReconcileStats, Reconciler};
pub use ledger::{CorruptionError, ErrorLedger};
pub use pending::PendingSet;
