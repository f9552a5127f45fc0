//! Streaming sort-merge reconciliation of two ascending-key row streams.
//!
//! The reconciler consumes one chunk from each side at a time. Rows wait in a
//! per-side [`PendingSet`] until their key shows up on the other side or until
//! it is provably too late for that to happen.
//!
//! # Watermark flush
//!
//! Each side keeps a watermark: the largest key it has delivered. When the
//! first key of an incoming B chunk is already above A's watermark, every
//! future B key is larger still, so nothing pending on A can ever be matched
//! and the whole A set is flushed as omissions. The same test in the other
//! direction flushes B as creations. This keeps memory bounded when one side
//! runs far ahead of the other.
//!
//! The argument only holds if each side really is strictly ascending across
//! chunks, so every chunk is validated before anything is mutated and an
//! out-of-order key fails the run.

use serde::Serialize;
use tracing::debug;

use super::ledger::ErrorLedger;
use super::pending::PendingSet;
use crate::core::{Chunk, PkValue, Row, Side};
use crate::error::{Result, VerifyError};

/// Counters describing what a run has consumed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Rows ingested from side A.
    pub rows_a: u64,
    /// Rows ingested from side B.
    pub rows_b: u64,
    /// Keys matched with identical rows (no finding recorded).
    pub matched: u64,
    /// Chunk pairs ingested.
    pub chunk_pairs: u64,
    /// Watermark flushes of side A.
    pub flushes_a: u64,
    /// Watermark flushes of side B.
    pub flushes_b: u64,
}

/// Final result of a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub ledger: ErrorLedger,
    pub stats: ReconcileStats,
}

/// Per-side state: rows waiting for a match plus ordering bookkeeping.
#[derive(Debug, Default)]
struct SideState {
    pending: PendingSet,
    /// Largest key delivered since the last flush. `None` means unset,
    /// which is not the same thing as key 0.
    watermark: Option<PkValue>,
    /// Largest key ever delivered. Never cleared, used for order validation.
    last_key: Option<PkValue>,
}

/// Sort-merge diff engine over two chunked, ascending-key streams.
///
/// Single-writer: one driver owns it and feeds chunk pairs in arrival order.
/// It performs no I/O and holds no locks.
#[derive(Debug, Default)]
pub struct Reconciler {
    a: SideState,
    b: SideState,
    ledger: ErrorLedger,
    stats: ReconcileStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest the next chunk of each side.
    ///
    /// Either chunk may be empty. On error nothing has been modified and the
    /// run should be abandoned.
    pub fn ingest_chunk_pair(&mut self, chunk_a: Chunk, chunk_b: Chunk) -> Result<()> {
        let keyed_a = key_chunk(Side::A, chunk_a, self.a.last_key.as_ref())?;
        let keyed_b = key_chunk(Side::B, chunk_b, self.b.last_key.as_ref())?;

        // Both tests read the watermarks as they were on entry.
        let flush_a = exceeds(keyed_b.first().map(|(k, _)| k), self.a.watermark.as_ref());
        let flush_b = exceeds(keyed_a.first().map(|(k, _)| k), self.b.watermark.as_ref());
        if flush_a {
            self.flush(Side::A);
        }
        if flush_b {
            self.flush(Side::B);
        }

        self.stats.rows_a += keyed_a.len() as u64;
        self.stats.rows_b += keyed_b.len() as u64;
        self.stats.chunk_pairs += 1;

        absorb(&mut self.a, keyed_a);
        absorb(&mut self.b, keyed_b);

        self.match_pending();
        Ok(())
    }

    /// Flush everything still pending and hand back the findings.
    ///
    /// Call once both sources are exhausted.
    pub fn finalize(mut self) -> ReconcileOutcome {
        for row in self.a.pending.drain() {
            self.ledger.record_omission(row);
        }
        for row in self.b.pending.drain() {
            self.ledger.record_creation(row);
        }
        debug!(
            "Reconciliation finalized: {} corrupted, {} omitted, {} created, {} matched",
            self.ledger.num_corruption(),
            self.ledger.num_omission(),
            self.ledger.num_creation(),
            self.stats.matched
        );
        ReconcileOutcome {
            ledger: self.ledger,
            stats: self.stats,
        }
    }

    /// Findings recorded so far.
    pub fn ledger(&self) -> &ErrorLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Current watermark of one side, `None` when unset.
    pub fn watermark(&self, side: Side) -> Option<&PkValue> {
        self.side(side).watermark.as_ref()
    }

    /// Number of rows of one side waiting for a counterpart.
    pub fn pending_len(&self, side: Side) -> usize {
        self.side(side).pending.len()
    }

    fn side(&self, side: Side) -> &SideState {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    /// Move every pending row of `side` into its terminal classification.
    fn flush(&mut self, side: Side) {
        let state = match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        };
        let rows = state.pending.drain();
        state.watermark = None;

        debug!("Watermark flush of side {}: {} rows", side, rows.len());
        match side {
            Side::A => {
                self.stats.flushes_a += 1;
                for row in rows {
                    self.ledger.record_omission(row);
                }
            }
            Side::B => {
                self.stats.flushes_b += 1;
                for row in rows {
                    self.ledger.record_creation(row);
                }
            }
        }
    }

    /// Resolve every key pending on both sides.
    fn match_pending(&mut self) {
        for key in self.a.pending.common_keys(&self.b.pending) {
            let (Some(row_a), Some(row_b)) =
                (self.a.pending.remove(&key), self.b.pending.remove(&key))
            else {
                continue;
            };
            if row_a.differs_from(&row_b) {
                self.ledger.record_corruption(row_a, row_b);
            } else {
                self.stats.matched += 1;
            }
        }
    }
}

/// Whether an incoming first key lies strictly above a set watermark.
fn exceeds(first_key: Option<&PkValue>, watermark: Option<&PkValue>) -> bool {
    matches!((first_key, watermark), (Some(first), Some(mark)) if first > mark)
}

/// Extract keys and check strict ascending order against the side's history.
fn key_chunk(side: Side, chunk: Chunk, last_key: Option<&PkValue>) -> Result<Vec<(PkValue, Row)>> {
    let mut keyed: Vec<(PkValue, Row)> = Vec::with_capacity(chunk.len());
    for row in chunk {
        let key = row.key(side)?;
        let previous = keyed.last().map(|(k, _)| k).or(last_key);
        if let Some(previous) = previous {
            if key <= *previous {
                return Err(VerifyError::OrderViolation {
                    side,
                    key: key.to_string(),
                    previous: previous.to_string(),
                });
            }
        }
        keyed.push((key, row));
    }
    Ok(keyed)
}

/// Advance the watermark and queue the rows of a validated chunk.
fn absorb(state: &mut SideState, keyed: Vec<(PkValue, Row)>) {
    if let Some((last, _)) = keyed.last() {
        state.watermark = Some(last.clone());
        state.last_key = Some(last.clone());
    }
    for (key, row) in keyed {
        state.pending.insert(key, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{int_row, SqlValue};

    fn counts(outcome: &ReconcileOutcome) -> (u64, u64, u64) {
        (
            outcome.ledger.num_corruption(),
            outcome.ledger.num_omission(),
            outcome.ledger.num_creation(),
        )
    }

    fn run(pairs: Vec<(Vec<Row>, Vec<Row>)>) -> ReconcileOutcome {
        let mut reconciler = Reconciler::new();
        for (a, b) in pairs {
            reconciler.ingest_chunk_pair(a, b).unwrap();
        }
        reconciler.finalize()
    }

    #[test]
    fn test_empty_sources() {
        let outcome = run(vec![(vec![], vec![])]);
        assert_eq!(counts(&outcome), (0, 0, 0));
    }

    #[test]
    fn test_single_omission() {
        let outcome = run(vec![(vec![int_row(&[1, 2])], vec![])]);
        assert_eq!(counts(&outcome), (0, 1, 0));
    }

    #[test]
    fn test_single_creation() {
        let outcome = run(vec![(vec![], vec![int_row(&[1, 2])])]);
        assert_eq!(counts(&outcome), (0, 0, 1));
    }

    #[test]
    fn test_single_corruption() {
        let outcome = run(vec![(vec![int_row(&[1, 1])], vec![int_row(&[1, 2])])]);
        assert_eq!(counts(&outcome), (1, 0, 0));
        let err = &outcome.ledger.corruption_errors()[0];
        assert_eq!(err.row_a, int_row(&[1, 1]));
        assert_eq!(err.row_b, int_row(&[1, 2]));
    }

    #[test]
    fn test_second_pair_does_not_disturb_first_corruption() {
        let outcome = run(vec![
            (vec![int_row(&[1, 1])], vec![int_row(&[1, 2])]),
            (vec![int_row(&[2, 2])], vec![int_row(&[2, 2])]),
        ]);
        assert_eq!(counts(&outcome), (1, 0, 0));
        assert_eq!(outcome.stats.matched, 1);
    }

    #[test]
    fn test_row_flushed_by_finalize_counted_once() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 2])], vec![])
            .unwrap();
        reconciler.ingest_chunk_pair(vec![], vec![]).unwrap();
        assert_eq!(reconciler.ledger().total_errors(), 0);
        assert_eq!(reconciler.stats().flushes_a, 0);

        let outcome = reconciler.finalize();
        assert_eq!(counts(&outcome), (0, 1, 0));
    }

    #[test]
    fn test_watermark_flush_of_side_a() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 0]), int_row(&[2, 0])], vec![])
            .unwrap();
        assert_eq!(reconciler.watermark(Side::A), Some(&PkValue::Int(2)));

        reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[3, 0])])
            .unwrap();
        assert_eq!(reconciler.ledger().num_omission(), 2);
        assert_eq!(reconciler.pending_len(Side::A), 0);
        assert_eq!(reconciler.watermark(Side::A), None);
        assert_eq!(reconciler.stats().flushes_a, 1);
    }

    #[test]
    fn test_watermark_flush_of_side_b() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[4, 0])])
            .unwrap();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[5, 0])], vec![])
            .unwrap();
        assert_eq!(reconciler.ledger().num_creation(), 1);
        assert_eq!(reconciler.ledger().creation_errors(), &[int_row(&[4, 0])]);
        // The A row that triggered the flush is still waiting.
        assert_eq!(reconciler.pending_len(Side::A), 1);
    }

    #[test]
    fn test_both_sides_flush_in_one_call() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 0])], vec![int_row(&[2, 0])])
            .unwrap();
        assert_eq!(reconciler.pending_len(Side::A), 1);
        assert_eq!(reconciler.pending_len(Side::B), 1);

        reconciler
            .ingest_chunk_pair(vec![int_row(&[3, 0])], vec![int_row(&[4, 0])])
            .unwrap();
        assert_eq!(reconciler.ledger().num_omission(), 1);
        assert_eq!(reconciler.ledger().num_creation(), 1);
        assert_eq!(reconciler.stats().flushes_a, 1);
        assert_eq!(reconciler.stats().flushes_b, 1);
    }

    #[test]
    fn test_zero_is_a_set_watermark() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[0, 9])], vec![])
            .unwrap();
        assert_eq!(reconciler.watermark(Side::A), Some(&PkValue::Int(0)));

        reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[1, 9])])
            .unwrap();
        assert_eq!(reconciler.ledger().omission_errors(), &[int_row(&[0, 9])]);
    }

    #[test]
    fn test_empty_chunk_never_triggers_flush() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 0])], vec![int_row(&[2, 0])])
            .unwrap();
        for _ in 0..3 {
            reconciler.ingest_chunk_pair(vec![], vec![]).unwrap();
        }
        assert!(reconciler.ledger().is_clean());
        assert_eq!(reconciler.watermark(Side::A), Some(&PkValue::Int(1)));
        assert_eq!(reconciler.watermark(Side::B), Some(&PkValue::Int(2)));
    }

    #[test]
    fn test_no_premature_flush_when_ranges_overlap() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(
                vec![int_row(&[1, 0]), int_row(&[5, 0])],
                vec![int_row(&[2, 0]), int_row(&[3, 0])],
            )
            .unwrap();
        // B's next chunk starts at 5, which A's watermark still covers.
        reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[5, 0])])
            .unwrap();
        assert_eq!(reconciler.stats().flushes_a, 0);
        assert_eq!(reconciler.stats().matched, 1);

        let outcome = reconciler.finalize();
        assert_eq!(counts(&outcome), (0, 1, 2));
    }

    #[test]
    fn test_pending_stays_bounded_when_b_runs_ahead() {
        let mut reconciler = Reconciler::new();
        for page in 0..50i64 {
            let a: Vec<Row> = (0..10).map(|i| int_row(&[page * 10 + i, 0])).collect();
            let b: Vec<Row> = (0..10)
                .map(|i| int_row(&[10_000 + page * 10 + i, 0]))
                .collect();
            reconciler.ingest_chunk_pair(a, b).unwrap();
            assert!(reconciler.pending_len(Side::A) <= 10);
        }
        let outcome = reconciler.finalize();
        assert_eq!(counts(&outcome), (0, 500, 500));
    }

    #[test]
    fn test_unequal_width_is_corruption() {
        let outcome = run(vec![(vec![int_row(&[1, 2])], vec![int_row(&[1, 2, 3])])]);
        assert_eq!(counts(&outcome), (1, 0, 0));
    }

    #[test]
    fn test_nan_payload_is_corruption() {
        let row = || Row::new(vec![SqlValue::I64(1), SqlValue::F64(f64::NAN)]);
        let outcome = run(vec![(vec![row()], vec![row()])]);
        assert_eq!(counts(&outcome), (1, 0, 0));
        assert_eq!(outcome.stats.matched, 0);
    }

    #[test]
    fn test_out_of_order_across_chunks_is_fault() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[5, 0])], vec![int_row(&[5, 0])])
            .unwrap();
        let err = reconciler
            .ingest_chunk_pair(vec![int_row(&[3, 0])], vec![])
            .unwrap_err();
        assert!(matches!(err, VerifyError::OrderViolation { side: Side::A, .. }));
    }

    #[test]
    fn test_repeated_key_is_fault_and_never_reopens() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 0])], vec![int_row(&[1, 0])])
            .unwrap();
        let err = reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[1, 7])])
            .unwrap_err();
        assert!(matches!(err, VerifyError::OrderViolation { side: Side::B, .. }));
        let outcome = reconciler.finalize();
        assert_eq!(counts(&outcome), (0, 0, 0));
        assert_eq!(outcome.stats.matched, 1);
    }

    #[test]
    fn test_unsorted_chunk_is_fault_and_leaves_state_untouched() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[1, 0])], vec![])
            .unwrap();
        let err = reconciler
            .ingest_chunk_pair(
                vec![int_row(&[2, 0])],
                vec![int_row(&[9, 0]), int_row(&[4, 0])],
            )
            .unwrap_err();
        assert!(matches!(err, VerifyError::OrderViolation { side: Side::B, .. }));
        // The flush that chunk would have triggered did not happen.
        assert_eq!(reconciler.pending_len(Side::A), 1);
        assert_eq!(reconciler.stats().rows_a, 1);
        assert!(reconciler.ledger().is_clean());
    }

    #[test]
    fn test_flushed_side_still_rejects_older_keys() {
        let mut reconciler = Reconciler::new();
        reconciler
            .ingest_chunk_pair(vec![int_row(&[10, 0])], vec![])
            .unwrap();
        reconciler
            .ingest_chunk_pair(vec![], vec![int_row(&[11, 0])])
            .unwrap();
        assert_eq!(reconciler.watermark(Side::A), None);
        assert!(reconciler
            .ingest_chunk_pair(vec![int_row(&[10, 0])], vec![])
            .is_err());
    }

    #[test]
    fn test_null_key_is_fault() {
        let mut reconciler = Reconciler::new();
        let row = Row::new(vec![SqlValue::Null, SqlValue::I64(1)]);
        let err = reconciler.ingest_chunk_pair(vec![row], vec![]).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidKey { side: Side::A, .. }));
    }

    #[test]
    fn test_text_keys() {
        let row = |k: &str, v: i64| Row::new(vec![SqlValue::from(k), SqlValue::I64(v)]);
        let outcome = run(vec![
            (vec![row("alpha", 1), row("beta", 2)], vec![row("alpha", 1)]),
            (vec![row("delta", 4)], vec![row("gamma", 3)]),
        ]);
        assert_eq!(counts(&outcome), (0, 2, 1));
        assert_eq!(outcome.stats.matched, 1);
    }

    #[test]
    fn test_text_keys_are_ordered_by_bytes() {
        let row = |k: &str| Row::new(vec![SqlValue::from(k), SqlValue::I64(0)]);

        // COLLATE "C" order: uppercase before lowercase.
        let bytes = || vec![row("Banana"), row("apple"), row("cherry")];
        let outcome = run(vec![(bytes(), bytes())]);
        assert!(outcome.ledger.is_clean());
        assert_eq!(outcome.stats.matched, 3);

        // Dictionary order as a locale collation would return it.
        let dictionary = || vec![row("apple"), row("Banana"), row("cherry")];
        let err = Reconciler::new()
            .ingest_chunk_pair(dictionary(), dictionary())
            .unwrap_err();
        assert!(matches!(err, VerifyError::OrderViolation { side: Side::A, .. }));
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let mut reconciler = Reconciler::new();
        let mut last = None;
        for start in [0i64, 3, 6, 9] {
            let chunk = vec![int_row(&[start, 0]), int_row(&[start + 1, 0])];
            reconciler.ingest_chunk_pair(chunk.clone(), chunk).unwrap();
            let mark = reconciler.watermark(Side::A).cloned();
            assert!(mark >= last);
            last = mark;
        }
    }
}
