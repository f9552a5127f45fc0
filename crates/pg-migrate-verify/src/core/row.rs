//! Row and side types shared by chunk sources and the reconciler.

use std::fmt;

use serde::Serialize;

use super::value::{PkValue, SqlValue};
use crate::error::{Result, VerifyError};

/// Which of the two databases a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    /// Pre-migration database.
    A,
    /// Post-migration database.
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// One table row: column 0 is the primary key, the rest is payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Vec<SqlValue>);

impl Row {
    /// Create a row from its column values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Extract the primary key from column 0.
    pub fn key(&self, side: Side) -> Result<PkValue> {
        let first = self
            .0
            .first()
            .ok_or_else(|| VerifyError::invalid_key(side, "row has no columns"))?;
        PkValue::try_from(first).map_err(|reason| VerifyError::invalid_key(side, reason))
    }

    /// All columns after the primary key.
    pub fn payload(&self) -> &[SqlValue] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Number of columns including the key.
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Column values.
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    /// Whether a row with the same key carries different data.
    ///
    /// Rows of unequal width always differ.
    pub fn differs_from(&self, other: &Row) -> bool {
        self.width() != other.width() || self.payload() != other.payload()
    }
}

impl From<Vec<SqlValue>> for Row {
    fn from(values: Vec<SqlValue>) -> Self {
        Self(values)
    }
}

/// A page of rows from one side, strictly ascending by primary key.
pub type Chunk = Vec<Row>;

#[cfg(test)]
pub(crate) fn int_row(values: &[i64]) -> Row {
    Row(values.iter().map(|v| SqlValue::I64(*v)).collect())
}
