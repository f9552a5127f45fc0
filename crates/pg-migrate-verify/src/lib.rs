//! # pg-migrate-verify
//!
//! Row-level verification of a PostgreSQL migration.
//!
//! The library reads one table from a pre-migration database (side A) and a
//! post-migration database (side B), both in ascending primary key order and
//! in fixed-size chunks, and classifies every difference:
//!
//! - **Corruption**: the key exists on both sides but the rows differ
//! - **Omission**: the key exists only on side A
//! - **Creation**: the key exists only on side B
//!
//! Memory stays bounded by the chunk size plus the rows that are out of step
//! between the two sides, not by table size.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_migrate_verify::{Config, PostgresChunkSource, Side, VerifyEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pg_migrate_verify::VerifyError> {
//!     let config = Config::load("config.yaml")?;
//!     let a = PostgresChunkSource::connect(Side::A, &config.source_a, &config.verify).await?;
//!     let b = PostgresChunkSource::connect(Side::B, &config.source_b, &config.verify).await?;
//!     let report = VerifyEngine::new(a, b).run(CancellationToken::new()).await?;
//!     println!("{} discrepancies", report.total_errors);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod source;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, VerifySettings};
pub use core::{Chunk, PkValue, Row, Side, SqlValue};
pub use error::{Result, VerifyError};
pub use reconcile::{CorruptionError, ErrorLedger, ReconcileOutcome, ReconcileStats, Reconciler};
pub use report::{render_summary, ReportWriter};
pub use source::{ChunkSource, HealthStatus, MemoryChunkSource, PostgresChunkSource};
pub use verify::{VerifyEngine, VerifyProgressUpdate, VerifyReport};
