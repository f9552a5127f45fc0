//! Per-side set of rows waiting for a counterpart.

use std::collections::BTreeMap;

use crate::core::{PkValue, Row};

/// Rows from one side that have been neither matched nor flushed.
///
/// Backed by a `BTreeMap`, so every traversal is in ascending key order and
/// the ledger contents never depend on the order rows were inserted.
#[derive(Debug, Default)]
pub struct PendingSet {
    rows: BTreeMap<PkValue, Row>,
}

impl PendingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row. A row already pending under the same key is replaced.
    pub fn insert(&mut self, key: PkValue, row: Row) {
        self.rows.insert(key, row);
    }

    /// Remove and return the row pending under `key`.
    pub fn remove(&mut self, key: &PkValue) -> Option<Row> {
        self.rows.remove(key)
    }

    pub fn contains(&self, key: &PkValue) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take every pending row in ascending key order, leaving the set empty.
    pub fn drain(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows).into_values().collect()
    }

    /// Keys pending on both sides, ascending.
    ///
    /// Walks the smaller set and probes the larger one.
    pub fn common_keys(&self, other: &PendingSet) -> Vec<PkValue> {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .rows
            .keys()
            .filter(|k| large.contains(k))
            .cloned()
            .collect()
    }
}
