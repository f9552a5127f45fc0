//! SQL value types for comparing rows fetched from two databases.
//!
//! [`SqlValue`] holds one owned column value. [`PkValue`] is the subset of
//! values that can serve as a totally ordered primary key, which is what the
//! reconciliation engine sorts and matches on.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// SQL value enum for type-safe row handling.
///
/// Equality is value equality within a variant. There is no coercion across
/// variants, so `I32(1)` and `I64(1)` are different values: a migration that
/// widened a column is reported rather than silently accepted.
///
/// Floats compare with IEEE semantics: `F32(NaN)`/`F64(NaN)` is unequal to
/// itself, so a row holding NaN never matches, even against an identical
/// copy, and is reported as corruption.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Text data (text, varchar, char, json rendered as text).
    Text(String),

    /// Binary data (bytea).
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::I16(_) => "int2",
            SqlValue::I32(_) => "int4",
            SqlValue::I64(_) => "int8",
            SqlValue::F32(_) => "float4",
            SqlValue::F64(_) => "float8",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytea",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "numeric",
            SqlValue::DateTime(_) => "timestamp",
            SqlValue::DateTimeOffset(_) => "timestamptz",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::I16(v) => serializer.serialize_i16(*v),
            SqlValue::I32(v) => serializer.serialize_i32(*v),
            SqlValue::I64(v) => serializer.serialize_i64(*v),
            SqlValue::F32(v) => serializer.serialize_f32(*v),
            SqlValue::F64(v) => serializer.serialize_f64(*v),
            SqlValue::Text(v) => serializer.serialize_str(v),
            SqlValue::Bytes(v) => {
                let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
                serializer.serialize_str(&format!("\\x{}", hex))
            }
            SqlValue::Uuid(v) => serializer.collect_str(v),
            SqlValue::Decimal(v) => serializer.collect_str(v),
            SqlValue::DateTime(v) => serializer.collect_str(&v.format("%Y-%m-%dT%H:%M:%S%.f")),
            SqlValue::DateTimeOffset(v) => serializer.serialize_str(&v.to_rfc3339()),
            SqlValue::Date(v) => serializer.collect_str(v),
            SqlValue::Time(v) => serializer.collect_str(v),
        }
    }
}

// From implementations for common types
impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Primary key value with a total order.
///
/// A single table uses one variant throughout, so the cross-variant order
/// (Int < Uuid < String) only exists to make `Ord` total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum PkValue {
    /// Integer primary key (covers smallint, int, bigint).
    Int(i64),
    /// UUID primary key.
    Uuid(Uuid),
    /// String primary key (text, varchar, char).
    String(String),
}

impl PkValue {
    /// Convert to a SQL literal string for keyset pagination.
    ///
    /// Single quotes are doubled. Keys come from the database being verified,
    /// never from user input.
    pub fn to_sql_literal(&self) -> String {
        match self {
            PkValue::Int(v) => v.to_string(),
            PkValue::Uuid(v) => format!("'{}'", v),
            PkValue::String(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::Uuid(v) => write!(f, "{}", v),
            PkValue::String(v) => write!(f, "'{}'", v),
        }
    }
}

impl TryFrom<&SqlValue> for PkValue {
    type Error = String;

    fn try_from(value: &SqlValue) -> Result<Self, Self::Error> {
        match value {
            SqlValue::I16(v) => Ok(PkValue::Int(i64::from(*v))),
            SqlValue::I32(v) => Ok(PkValue::Int(i64::from(*v))),
            SqlValue::I64(v) => Ok(PkValue::Int(*v)),
            SqlValue::Uuid(v) => Ok(PkValue::Uuid(*v)),
            SqlValue::Text(v) => Ok(PkValue::String(v.clone())),
            SqlValue::Null => Err("primary key is NULL".to_string()),
            other => Err(format!(
                "primary key of type {} is not supported (use an integer, uuid, or text key)",
                other.type_name()
            )),
        }
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<i32> for PkValue {
    fn from(v: i32) -> Self {
        PkValue::Int(v as i64)
    }
}

impl From<Uuid> for PkValue {
    fn from(v: Uuid) -> Self {
        PkValue::Uuid(v)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::String(v.to_string())
    }
}
