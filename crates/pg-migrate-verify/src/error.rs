//! Error types for the verification library.
//!
//! Discrepancies between the two databases are *findings* and live in the
//! [`ErrorLedger`](crate::reconcile::ErrorLedger). The variants below are
//! faults: anything that prevents a trustworthy verification run.

use thiserror::Error;

use crate::core::Side;

/// Exit code for configuration problems (bad YAML, missing fields).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection, query, or table discovery failures.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for chunk ordering violations and unusable primary keys.
pub const EXIT_ORDER_VIOLATION: u8 = 3;
/// Exit code for a completed run that found discrepancies.
pub const EXIT_DISCREPANCIES: u8 = 4;
/// Exit code for a run cancelled by a signal.
pub const EXIT_CANCELLED: u8 = 5;
/// Exit code for filesystem errors and report serialization failures.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for verification operations.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A chunk arrived out of primary key order.
    #[error(
        "Ordering violation on side {side}: key {key} arrived after {previous}; \
         chunks must be strictly ascending by primary key"
    )]
    OrderViolation {
        side: Side,
        key: String,
        previous: String,
    },

    /// A row carried no usable primary key in column 0.
    #[error("Invalid primary key on side {side}: {reason}")]
    InvalidKey { side: Side, reason: String },

    /// The table to verify could not be resolved.
    #[error("Table discovery failed: {0}")]
    TableDiscovery(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error while writing reports or `--output-json`
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification was cancelled (SIGINT, etc.)
    #[error("Verification cancelled")]
    Cancelled,
}

impl VerifyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        VerifyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InvalidKey error for one side.
    pub fn invalid_key(side: Side, reason: impl Into<String>) -> Self {
        VerifyError::InvalidKey {
            side,
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            VerifyError::Config(_) | VerifyError::Yaml(_) => EXIT_CONFIG_ERROR,
            VerifyError::Source(_) | VerifyError::Pool { .. } | VerifyError::TableDiscovery(_) => {
                EXIT_SOURCE_ERROR
            }
            VerifyError::OrderViolation { .. } | VerifyError::InvalidKey { .. } => {
                EXIT_ORDER_VIOLATION
            }
            VerifyError::Cancelled => EXIT_CANCELLED,
            VerifyError::Io(_) | VerifyError::Json(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
