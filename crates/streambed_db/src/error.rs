//! Database-layer errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Failures talking to the target database.
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection, statement or pool failure
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Filesystem failure while locating or creating database files
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
