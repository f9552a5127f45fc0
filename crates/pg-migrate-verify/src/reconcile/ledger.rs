//! Append-only record of discrepancies found during one run.

use serde::Serialize;

use crate::core::Row;

/// A key present on both sides whose rows differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorruptionError {
    /// Row as read from the pre-migration database.
    pub row_a: Row,
    /// Row as read from the post-migration database.
    pub row_b: Row,
}

/// Discrepancies found by one reconciliation run.
///
/// Entries are never modified or removed once recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorLedger {
    corruption_errors: Vec<CorruptionError>,
    omission_errors: Vec<Row>,
    creation_errors: Vec<Row>,
    num_corruption: u64,
    num_omission: u64,
    num_creation: u64,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key whose payload changed between A and B.
    pub fn record_corruption(&mut self, row_a: Row, row_b: Row) {
        self.corruption_errors.push(CorruptionError { row_a, row_b });
        self.num_corruption += 1;
    }

    /// Record a row of A that never appeared in B.
    pub fn record_omission(&mut self, row: Row) {
        self.omission_errors.push(row);
        self.num_omission += 1;
    }

    /// Record a row of B that never existed in A.
    pub fn record_creation(&mut self, row: Row) {
        self.creation_errors.push(row);
        self.num_creation += 1;
    }

    pub fn num_corruption(&self) -> u64 {
        self.num_corruption
    }

    pub fn num_omission(&self) -> u64 {
        self.num_omission
    }

    pub fn num_creation(&self) -> u64 {
        self.num_creation
    }

    /// Total number of findings of all three kinds.
    pub fn total_errors(&self) -> u64 {
        self.num_corruption + self.num_omission + self.num_creation
    }

    pub fn is_clean(&self) -> bool {
        self.total_errors() == 0
    }

    pub fn corruption_errors(&self) -> &[CorruptionError] {
        &self.corruption_errors
    }

    pub fn omission_errors(&self) -> &[Row] {
        &self.omission_errors
    }

    pub fn creation_errors(&self) -> &[Row] {
        &self.creation_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::int_row;

    #[test]
    fn test_new_ledger_is_clean() {
        let ledger = ErrorLedger::new();
        assert!(ledger.is_clean());
        assert_eq!(ledger.total_errors(), 0);
    }

    #[test]
    fn test_records_keep_order_and_counts() {
        let mut ledger = ErrorLedger::new();
        ledger.record_omission(int_row(&[1, 1]));
        ledger.record_omission(int_row(&[2, 2]));
        ledger.record_creation(int_row(&[9, 9]));
        ledger.record_corruption(int_row(&[3, 1]), int_row(&[3, 2]));

        assert_eq!(ledger.num_omission(), 2);
        assert_eq!(ledger.num_creation(), 1);
        assert_eq!(ledger.num_corruption(), 1);
        assert_eq!(ledger.total_errors(), 4);
        assert_eq!(
            ledger.omission_errors(),
            &[int_row(&[1, 1]), int_row(&[2, 2])]
        );
        assert_eq!(ledger.corruption_errors()[0].row_b, int_row(&[3, 2]));
        assert!(!ledger.is_clean());
    }
}
