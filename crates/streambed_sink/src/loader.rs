//! Batch loading against the target database.
//!
//! One load call applies exactly one strategy. Append-only and upsert commit
//! a transaction per sub-batch; overwrite spans a single transaction from
//! the initial delete through the last insert so a mid-batch failure leaves
//! exactly the pre-overwrite row set.

use crate::encoding::{decode_hex, DecodeError};
use crate::error::{Result, SinkError};
use crate::planner::TableDefinition;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;
use streambed_db::{qualified_table, quote_ident, TargetDb};
use streambed_protocol::{ColumnType, LoadMethod, Record, RecordBatch, TargetConfig};
use tracing::{debug, info};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Outcome of one batch load.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSummary {
    pub rows_written: u64,
    pub sub_batches: usize,
}

/// Create the stream's table, or add any columns the live table is missing.
pub(crate) async fn ensure_table(db: &TargetDb, definition: &TableDefinition) -> Result<()> {
    let schema = db.target_schema();
    if !db.table_exists(schema, definition.stream()).await? {
        let sql = definition.create_table_sql(schema);
        debug!(stream = definition.stream(), %sql, "Creating table");
        sqlx::query(&sql).execute(db.pool()).await?;
        info!(stream = definition.stream(), "Created table");
        return Ok(());
    }

    let existing: HashSet<String> = db
        .table_columns(schema, definition.stream())
        .await?
        .into_iter()
        .map(|column| column.name)
        .collect();
    for (name, ty) in definition.all_columns() {
        if !existing.contains(name) {
            let sql = definition.add_column_sql(schema, name, ty);
            sqlx::query(&sql).execute(db.pool()).await?;
            info!(stream = definition.stream(), column = name, "Added column");
        }
    }
    Ok(())
}

struct RowStamps {
    extracted_at: DateTime<Utc>,
    batched_at: DateTime<Utc>,
    version: Option<i64>,
}

pub(crate) struct BatchLoader<'a> {
    db: &'a TargetDb,
    config: &'a TargetConfig,
    definition: &'a TableDefinition,
}

impl<'a> BatchLoader<'a> {
    pub(crate) fn new(
        db: &'a TargetDb,
        config: &'a TargetConfig,
        definition: &'a TableDefinition,
    ) -> Self {
        Self {
            db,
            config,
            definition,
        }
    }

    pub(crate) async fn load(&self, batch: &RecordBatch) -> Result<LoadSummary> {
        if self.config.load_method == LoadMethod::Upsert
            && self.definition.key_properties().is_empty()
        {
            return Err(SinkError::Config(format!(
                "upsert requires key properties for stream '{}'",
                self.definition.stream()
            )));
        }

        let batched_at = Utc::now();
        let stamps = RowStamps {
            extracted_at: batch.extracted_at.unwrap_or(batched_at),
            batched_at,
            version: batch.version,
        };

        let summary = match self.config.load_method {
            LoadMethod::Overwrite => self.load_overwrite(batch, &stamps).await?,
            _ => self.load_incremental(batch, &stamps).await?,
        };
        info!(
            stream = self.definition.stream(),
            rows = summary.rows_written,
            sub_batches = summary.sub_batches,
            method = %self.config.load_method,
            "Batch loaded"
        );
        Ok(summary)
    }

    fn chunk_size(&self, total: usize) -> usize {
        self.config.batch_size_rows.unwrap_or(total).max(1)
    }

    async fn load_incremental(&self, batch: &RecordBatch, stamps: &RowStamps) -> Result<LoadSummary> {
        let sql = self.insert_sql();
        let mut summary = LoadSummary::default();
        for chunk in batch.records.chunks(self.chunk_size(batch.records.len())) {
            let mut tx = self.db.pool().begin().await?;
            for record in chunk {
                summary.rows_written += self.insert_record(&mut tx, &sql, record, stamps).await?;
            }
            tx.commit().await?;
            summary.sub_batches += 1;
        }
        Ok(summary)
    }

    async fn load_overwrite(&self, batch: &RecordBatch, stamps: &RowStamps) -> Result<LoadSummary> {
        let sql = self.insert_sql();
        let table = qualified_table(self.db.target_schema(), self.definition.stream());
        let mut tx = self.db.pool().begin().await?;
        let replaced = sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let mut summary = LoadSummary {
            rows_written: 0,
            sub_batches: 1,
        };
        for record in &batch.records {
            summary.rows_written += self.insert_record(&mut tx, &sql, record, stamps).await?;
        }
        tx.commit().await?;
        debug!(
            stream = self.definition.stream(),
            replaced, "Overwrite replaced previous rows"
        );
        Ok(summary)
    }

    async fn insert_record(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        sql: &str,
        record: &Record,
        stamps: &RowStamps,
    ) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for (name, ty) in self.definition.data_columns() {
            query = bind_value(query, name, ty, record.get(name))?;
        }
        if self.definition.has_record_metadata() {
            query = query.bind(stamps.extracted_at).bind(stamps.batched_at);
        }
        if self.definition.has_version_metadata() {
            query = query.bind(None::<DateTime<Utc>>).bind(stamps.version);
        }
        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    fn insert_sql(&self) -> String {
        let columns: Vec<String> = self
            .definition
            .insert_columns()
            .iter()
            .map(|name| quote_ident(name))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified_table(self.db.target_schema(), self.definition.stream()),
            columns.join(", "),
            placeholders
        );

        if self.config.load_method == LoadMethod::Upsert {
            let keys = self.definition.key_properties();
            let conflict_target: Vec<String> = keys.iter().map(|k| quote_ident(k)).collect();
            let updates: Vec<String> = self
                .definition
                .insert_columns()
                .iter()
                .filter(|name| !keys.iter().any(|k| k.as_str() == **name))
                .map(|name| format!("{} = excluded.{}", quote_ident(name), quote_ident(name)))
                .collect();
            if updates.is_empty() {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO NOTHING",
                    conflict_target.join(", ")
                ));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT ({}) DO UPDATE SET {}",
                    conflict_target.join(", "),
                    updates.join(", ")
                ));
            }
        }
        sql
    }
}

fn bind_value<'q>(
    query: SqliteQuery<'q>,
    column: &str,
    ty: ColumnType,
    value: Option<&Value>,
) -> Result<SqliteQuery<'q>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(query.bind(None::<String>));
    };

    Ok(match ty {
        ColumnType::Bytea => match value {
            Value::String(s) => {
                let bytes = decode_hex(s).map_err(|source| SinkError::Decode {
                    column: column.to_string(),
                    source,
                })?;
                query.bind(bytes)
            }
            other => {
                return Err(SinkError::Decode {
                    column: column.to_string(),
                    source: DecodeError::NotAString(other.to_string()),
                })
            }
        },
        ColumnType::Json | ColumnType::ArrayOfJson => query.bind(value.to_string()),
        _ => match value {
            Value::String(s) => query.bind(s.clone()),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            other => query.bind(other.to_string()),
        },
    })
}
