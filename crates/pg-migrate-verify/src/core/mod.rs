//! Core data types for row-level migration verification.
//!
//! - [`value`]: SQL column values and totally ordered primary keys
//! - [`row`]: rows, chunks, and the A/B side marker

pub mod row;
pub mod value;

pub use row::{Chunk, Row, Side};
#[cfg(test)]
pub(crate) use row::int_row;
pub use value::{PkValue, SqlValue};
