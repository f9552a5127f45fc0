//! Verification run driver.
//!
//! Pulls one chunk from each side concurrently, feeds the pair to the
//! [`Reconciler`], and repeats until both sides are exhausted. Only this
//! driver touches the reconciler, so pairs are ingested strictly in the
//! order they arrive.

pub mod types;

pub use types::{error_percentage, VerifyProgressUpdate, VerifyReport};

use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Chunk, Side};
use crate::error::{Result, VerifyError};
use crate::reconcile::Reconciler;
use crate::source::ChunkSource;

/// Engine comparing one table across two chunk sources.
pub struct VerifyEngine<A, B> {
    source_a: A,
    source_b: B,
    table_name: String,
    config_hash: Option<String>,
    progress_tx: Option<mpsc::Sender<VerifyProgressUpdate>>,
}

impl<A: ChunkSource, B: ChunkSource> VerifyEngine<A, B> {
    /// Create a new verification engine.
    pub fn new(source_a: A, source_b: B) -> Self {
        Self {
            source_a,
            source_b,
            table_name: String::new(),
            config_hash: None,
            progress_tx: None,
        }
    }

    /// Name reported for the compared table. Without one, the name reported
    /// by source A (if any) is used once fetching has started.
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Record the configuration hash in the report.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Set progress channel for updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<VerifyProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Send progress update if channel is configured.
    async fn send_progress(&self, update: VerifyProgressUpdate) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(update).await;
        }
    }

    /// Run the verification to completion.
    ///
    /// Fetch errors and ordering violations abort the run. Cancellation is
    /// honored between and during fetches and discards all pending state.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<VerifyReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let desc_a = self.source_a.describe();
        let desc_b = self.source_b.describe();

        info!(
            "Starting verification of {}: A={} B={}",
            self.table_name, desc_a, desc_b
        );

        let mut reconciler = Reconciler::new();
        let mut done_a = false;
        let mut done_b = false;

        loop {
            if cancel.is_cancelled() {
                warn!("Verification of {} cancelled", self.table_name);
                return Err(VerifyError::Cancelled);
            }

            let source_a = &mut self.source_a;
            let source_b = &mut self.source_b;
            let (result_a, result_b) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Verification of {} cancelled during fetch", self.table_name);
                    return Err(VerifyError::Cancelled);
                }
                pair = async {
                    tokio::join!(fetch(source_a, done_a), fetch(source_b, done_b))
                } => pair,
            };

            let chunk_a = result_a?;
            let chunk_b = result_b?;

            if self.table_name.is_empty() {
                if let Some(name) = self.source_a.table_name() {
                    self.table_name = name;
                }
            }

            if chunk_a.is_empty() && !done_a {
                debug!("Side {} exhausted", Side::A);
                done_a = true;
            }
            if chunk_b.is_empty() && !done_b {
                debug!("Side {} exhausted", Side::B);
                done_b = true;
            }
            if done_a && done_b && chunk_a.is_empty() && chunk_b.is_empty() {
                break;
            }

            reconciler.ingest_chunk_pair(chunk_a, chunk_b)?;

            let stats = reconciler.stats();
            self.send_progress(VerifyProgressUpdate {
                table: self.table_name.clone(),
                chunk_pairs: stats.chunk_pairs,
                rows_a: stats.rows_a,
                rows_b: stats.rows_b,
                pending_a: reconciler.pending_len(Side::A),
                pending_b: reconciler.pending_len(Side::B),
                errors_found: reconciler.ledger().total_errors(),
            })
            .await;
        }

        let outcome = reconciler.finalize();
        let mut report = VerifyReport::from_outcome(
            outcome,
            self.table_name.clone(),
            desc_a,
            desc_b,
            started_at,
            start.elapsed().as_millis() as u64,
        );
        report.config_hash = self.config_hash.take();

        info!(
            "Verification of {} complete: {} rows A, {} rows B, {} corrupted, {} omitted, {} created ({:.2}% error) in {}ms",
            report.table_name,
            report.rows_a,
            report.rows_b,
            report.num_corruption,
            report.num_omission,
            report.num_creation,
            report.error_percentage,
            report.duration_ms
        );

        Ok(report)
    }
}

/// Poll a source unless it already reported end of stream.
async fn fetch<S: ChunkSource>(source: &mut S, done: bool) -> Result<Chunk> {
    if done {
        Ok(Vec::new())
    } else {
        source.next_chunk().await
    }
}
