//! Database layer for Streambed.
//!
//! Wraps a sqlx SQLite pool and owns target-schema handling: a non-`main`
//! target schema is an ATTACHed database file living beside the main file,
//! which is the SQLite rendition of "create schema" DDL. Every pool
//! connection re-runs the attachment, so schema-qualified statements work on
//! any connection the pool hands out.

mod error;
mod ident;

pub use error::{DbError, Result};
pub use ident::{qualified_table, quote_ident};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::info;

/// A column reported by table introspection.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub declared_type: String,
}

/// Connection pool for one load target.
#[derive(Debug, Clone)]
pub struct TargetDb {
    pool: SqlitePool,
    target_schema: String,
}

impl TargetDb {
    /// Open or create a database at the given path, attaching the target
    /// schema when it is not `main`.
    pub async fn open(path: impl AsRef<Path>, target_schema: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let target_schema = target_schema.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let attach_sql = file_attach_statement(&target_schema, path);
        let pool = pool_options(attach_sql)
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), schema = %target_schema, "Database opened");

        Ok(Self {
            pool,
            target_schema,
        })
    }

    /// In-memory database for tests. A single pooled connection keeps the
    /// main database and any attached schema consistent.
    pub async fn open_in_memory(target_schema: impl Into<String>) -> Result<Self> {
        let target_schema = target_schema.into();
        let options = SqliteConnectOptions::new().in_memory(true);

        let attach_sql = (target_schema != "main").then(|| {
            format!(
                "ATTACH DATABASE ':memory:' AS {}",
                quote_ident(&target_schema)
            )
        });
        let pool = pool_options(attach_sql)
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            target_schema,
        })
    }

    /// Schema name stream tables are created under.
    pub fn target_schema(&self) -> &str {
        &self.target_schema
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Whether a table exists in the given schema.
    pub async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = ?",
            quote_ident(schema)
        );
        let row = sqlx::query(&sql).bind(table).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    /// Introspect a table's columns (name and declared type).
    pub async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<TableColumn>> {
        let sql = format!(
            "PRAGMA {}.table_info({})",
            quote_ident(schema),
            quote_ident(table)
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| TableColumn {
                name: row.get("name"),
                declared_type: row.get("type"),
            })
            .collect())
    }
}

fn pool_options(attach_sql: Option<String>) -> SqlitePoolOptions {
    let mut options = SqlitePoolOptions::new();
    if let Some(sql) = attach_sql {
        options = options.after_connect(move |conn, _meta| {
            let sql = sql.clone();
            Box::pin(async move {
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            })
        });
    }
    options
}

fn file_attach_statement(schema: &str, db_path: &Path) -> Option<String> {
    if schema == "main" {
        return None;
    }
    let attach_path = db_path.with_file_name(format!("{schema}.sqlite3"));
    let literal = attach_path.display().to_string().replace('\'', "''");
    Some(format!(
        "ATTACH DATABASE '{}' AS {}",
        literal,
        quote_ident(schema)
    ))
}
