//! Column types and load strategies.
//!
//! `ColumnType` is the CANONICAL column type enumeration - every crate that
//! talks about table shapes uses this, never backend-native type names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Relational column type derived from a JSON Schema property.
///
/// Variants are declared in resolution priority order, highest first, so the
/// derived `Ord` doubles as the precedence relation: when a property allows
/// several JSON types, the smallest satisfied variant wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Binary payload decoded from a content-encoded string
    Bytea,
    /// JSON array
    ArrayOfJson,
    /// JSON object
    Json,
    /// Plain text; also the fallback when a schema carries no usable type info
    Text,
    /// String with `date-time` format
    Timestamp,
    /// String with `date` format
    Date,
    /// String with `time` format
    Time,
    /// JSON number
    Decimal,
    /// JSON integer
    BigInt,
    Boolean,
    /// Placeholder for properties whose declared type set is empty or
    /// entirely null/unrecognized; the column is still created (nullable)
    NoType,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bytea => "bytea",
            Self::ArrayOfJson => "array_of_json",
            Self::Json => "json",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
            Self::Decimal => "decimal",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::NoType => "notype",
        }
    }

    /// DDL type name on PostgreSQL.
    pub fn postgres_type(&self) -> &'static str {
        match self {
            Self::Bytea => "BYTEA",
            Self::ArrayOfJson => "JSONB[]",
            Self::Json => "JSONB",
            Self::Text | Self::NoType => "TEXT",
            Self::Timestamp => "TIMESTAMPTZ",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Decimal => "NUMERIC",
            Self::BigInt => "BIGINT",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// DDL type name on SQLite (affinity-based; JSON values are stored as text).
    pub fn sqlite_type(&self) -> &'static str {
        match self {
            Self::Bytea => "BLOB",
            Self::ArrayOfJson | Self::Json => "JSON",
            Self::Text | Self::NoType => "TEXT",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Decimal => "NUMERIC",
            Self::BigInt => "BIGINT",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Whether a column of this type may be re-declared as `target` without
    /// data loss. Widening never narrows: the relation is reflexive, NoType
    /// sits below everything, and only scalar types widen into Text.
    pub fn widens_to(self, target: Self) -> bool {
        use ColumnType::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (NoType, _)
                | (BigInt, Decimal)
                | (Timestamp | Date | Time | Decimal | BigInt | Boolean, Text)
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strategy for applying a record batch to its table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMethod {
    /// Every record becomes a new row (default)
    #[default]
    AppendOnly,
    /// Match on key properties; update matches, insert the rest
    Upsert,
    /// Remove all existing rows for the stream, then insert the batch
    Overwrite,
}

impl LoadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMethod::AppendOnly => "append-only",
            LoadMethod::Upsert => "upsert",
            LoadMethod::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for LoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoadMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append-only" => Ok(LoadMethod::AppendOnly),
            "upsert" => Ok(LoadMethod::Upsert),
            "overwrite" => Ok(LoadMethod::Overwrite),
            _ => Err(format!(
                "Invalid load method: '{}'. Expected: append-only, upsert, or overwrite",
                s
            )),
        }
    }
}
