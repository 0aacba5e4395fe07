//! Raw attribute and partition key values.
//!
//! [`SqlValue`] is the owned, database-agnostic representation of a single
//! column value as supplied by an entity-level operation. Values live only for
//! the duration of a routing decision or statement execution, so there is no
//! borrowed variant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw column value supplied per-operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (covers smallint through bigint).
    Int(i64),

    /// Double-precision floating point.
    Float(f64),

    /// Text value.
    Text(String),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "boolean",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Timestamp(_) => "timestamp",
        }
    }

    /// Render as a SQL literal for generated statements.
    ///
    /// Single quotes are doubled for text-like values. Key values are short
    /// machine-derived tokens; anything user-supplied still round-trips
    /// safely through the escaping.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
            SqlValue::Uuid(v) => format!("'{}'", v),
            SqlValue::Timestamp(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.6f%:z")),
        }
    }
}

/// Stringification used by key normalization (hashing, text buckets).
///
/// Must stay stable: the HashedModulo strategy feeds this representation into
/// the digest, so a formatting change would re-map every provisioned row.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, ""),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}
