//! Report files and the human-readable run summary.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::verify::VerifyReport;

pub const SUMMARY_FILE: &str = "summary.json";
pub const CORRUPTION_FILE: &str = "corruption_errors.json";
pub const OMISSION_FILE: &str = "omission_errors.json";
pub const CREATION_FILE: &str = "creation_errors.json";

/// Writes a finished [`VerifyReport`] into a directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write the summary and the three detail files.
    ///
    /// The directory is created if missing. Returns the paths written, the
    /// summary first.
    pub fn write(&self, report: &VerifyReport) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;

        let ledger = &report.ledger;
        let paths = vec![
            self.write_json(SUMMARY_FILE, report)?,
            self.write_json(CORRUPTION_FILE, ledger.corruption_errors())?,
            self.write_json(OMISSION_FILE, ledger.omission_errors())?,
            self.write_json(CREATION_FILE, ledger.creation_errors())?,
        ];

        info!("Wrote verification report to {}", self.dir.display());
        Ok(paths)
    }

    /// Atomic write: temp file, then rename.
    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let content = serde_json::to_string_pretty(value)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(path)
    }
}

/// Render the text summary printed at the end of a run.
pub fn render_summary(report: &VerifyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Verification Results: {}", report.table_name);
    let _ = writeln!(out, "  Source A: {}", report.source_a);
    let _ = writeln!(out, "  Source B: {}", report.source_b);
    let _ = writeln!(out, "  Rows read: {} (A) / {} (B)", report.rows_a, report.rows_b);
    let _ = writeln!(out, "  Matched rows: {}", report.matched);
    let _ = writeln!(out, "  Corrupted rows: {}", report.num_corruption);
    let _ = writeln!(out, "  Omitted rows: {}", report.num_omission);
    let _ = writeln!(out, "  Created rows: {}", report.num_creation);
    let _ = writeln!(out, "  Error percentage: {:.2}%", report.error_percentage);
    let _ = writeln!(out, "  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
    let _ = write!(
        out,
        "\n  Overall: {}",
        if report.is_clean() {
            "IN SYNC"
        } else {
            "DISCREPANCIES FOUND"
        }
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::int_row;
    use crate::reconcile::{ErrorLedger, ReconcileOutcome, ReconcileStats};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_report() -> VerifyReport {
        let mut ledger = ErrorLedger::new();
        ledger.record_corruption(int_row(&[1, 10]), int_row(&[1, 11]));
        ledger.record_omission(int_row(&[2, 20]));
        let outcome = ReconcileOutcome {
            ledger,
            stats: ReconcileStats {
                rows_a: 3,
                rows_b: 2,
                matched: 1,
                chunk_pairs: 1,
                ..Default::default()
            },
        };
        VerifyReport::from_outcome(
            outcome,
            "accounts".into(),
            "memory:a".into(),
            "memory:b".into(),
            Utc::now(),
            12,
        )
    }

    #[test]
    fn test_write_creates_all_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("reports");
        let paths = ReportWriter::new(&dir).write(&sample_report()).unwrap();

        assert_eq!(paths.len(), 4);
        assert!(paths[0].ends_with(SUMMARY_FILE));
        for path in &paths {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(!dir.join("summary.tmp").exists());
    }

    #[test]
    fn test_detail_files_hold_rows() {
        let tmp = TempDir::new().unwrap();
        let writer = ReportWriter::new(tmp.path());
        writer.write(&sample_report()).unwrap();

        let corruption: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(CORRUPTION_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(corruption[0]["row_a"], serde_json::json!([1, 10]));
        assert_eq!(corruption[0]["row_b"], serde_json::json!([1, 11]));

        let omission: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(OMISSION_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(omission, serde_json::json!([[2, 20]]));

        let creation = std::fs::read_to_string(tmp.path().join(CREATION_FILE)).unwrap();
        assert_eq!(creation.trim(), "[]");
    }

    #[test]
    fn test_render_summary() {
        let text = render_summary(&sample_report());
        assert!(text.contains("Verification Results: accounts"));
        assert!(text.contains("Corrupted rows: 1"));
        assert!(text.contains("Omitted rows: 1"));
        assert!(text.contains("Error percentage: 60.00%"));
        assert!(text.contains("DISCREPANCIES FOUND"));
    }
}
