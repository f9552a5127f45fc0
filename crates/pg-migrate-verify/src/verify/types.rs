//! Type definitions for verification runs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::reconcile::{ErrorLedger, ReconcileOutcome};

/// Outcome of one verification run.
///
/// Serializes to the run summary; the detail lists stay in `ledger` and are
/// written separately by the report writer.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    /// Table that was compared.
    pub table_name: String,
    /// Description of side A.
    pub source_a: String,
    /// Description of side B.
    pub source_b: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rows_a: u64,
    pub rows_b: u64,
    /// Keys present on both sides with identical rows.
    pub matched: u64,
    pub num_corruption: u64,
    pub num_omission: u64,
    pub num_creation: u64,
    pub total_errors: u64,
    /// Share of rows (over both sides) involved in a discrepancy.
    pub error_percentage: f64,
    pub chunk_pairs: u64,
    pub flushes_a: u64,
    pub flushes_b: u64,
    /// Hash of the settings the run used, when run from a config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(skip)]
    pub ledger: ErrorLedger,
}

impl VerifyReport {
    /// Assemble a report from a finalized reconciliation.
    pub fn from_outcome(
        outcome: ReconcileOutcome,
        table_name: String,
        source_a: String,
        source_b: String,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        let ReconcileOutcome { ledger, stats } = outcome;
        Self {
            table_name,
            source_a,
            source_b,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
            rows_a: stats.rows_a,
            rows_b: stats.rows_b,
            matched: stats.matched,
            num_corruption: ledger.num_corruption(),
            num_omission: ledger.num_omission(),
            num_creation: ledger.num_creation(),
            total_errors: ledger.total_errors(),
            error_percentage: error_percentage(&ledger, stats.rows_a, stats.rows_b),
            chunk_pairs: stats.chunk_pairs,
            flushes_a: stats.flushes_a,
            flushes_b: stats.flushes_b,
            config_hash: None,
            ledger,
        }
    }

    /// True when no discrepancy was found.
    pub fn is_clean(&self) -> bool {
        self.total_errors == 0
    }

    /// Rows accounted for by the findings and matches.
    ///
    /// Always equals `rows_a + rows_b` for a completed run.
    pub fn rows_accounted(&self) -> u64 {
        2 * self.num_corruption + self.num_omission + self.num_creation + 2 * self.matched
    }
}

/// Percentage of all rows read that take part in a discrepancy.
///
/// A corrupted key involves one row on each side, so it counts twice.
/// Returns 0.0 when both sides are empty.
pub fn error_percentage(ledger: &ErrorLedger, rows_a: u64, rows_b: u64) -> f64 {
    let total = rows_a + rows_b;
    if total == 0 {
        return 0.0;
    }
    let affected = 2 * ledger.num_corruption() + ledger.num_omission() + ledger.num_creation();
    100.0 * affected as f64 / total as f64
}

/// Progress update sent after each chunk pair.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyProgressUpdate {
    /// Table being verified.
    pub table: String,
    /// Chunk pairs ingested so far.
    pub chunk_pairs: u64,
    pub rows_a: u64,
    pub rows_b: u64,
    /// Rows waiting for a counterpart on each side.
    pub pending_a: usize,
    pub pending_b: usize,
    /// Discrepancies recorded so far.
    pub errors_found: u64,
}
