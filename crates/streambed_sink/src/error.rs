//! Error types for the load engine.

use crate::encoding::DecodeError;
use streambed_db::DbError;
use streambed_protocol::{ColumnType, ConfigError};
use thiserror::Error;

/// Load engine result type.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Load engine errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// An existing column's type cannot be widened to what the new schema
    /// needs. The batch is aborted and the table left unchanged.
    #[error("Schema conflict on {stream}.{column}: cannot widen {existing} to {requested}")]
    SchemaConflict {
        stream: String,
        column: String,
        existing: ColumnType,
        requested: ColumnType,
    },

    /// Content-encoding interpretation failed for a value. Aborts the whole
    /// batch; the surrounding transaction rolls back.
    #[error("Failed to decode value for column {column}: {source}")]
    Decode {
        column: String,
        #[source]
        source: DecodeError,
    },

    /// Invalid configuration or a signal the configuration does not allow
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend failure during DDL/DML, surfaced after rollback
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<ConfigError> for SinkError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(DbError::from(err))
    }
}
