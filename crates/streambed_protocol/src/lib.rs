//! Canonical types shared across Streambed crates.
//!
//! This crate is the single source of truth for the boundary between the
//! upstream record source and the load engine: JSON-Schema property
//! fragments, stream schemas, record batches, the column-type enumeration,
//! and the validated target configuration.

mod config;
mod schema;
mod types;

pub use config::{ConfigError, TargetConfig};
pub use schema::{JsonType, PropertySchema, Record, RecordBatch, StreamSchema};
pub use types::{ColumnType, LoadMethod};
