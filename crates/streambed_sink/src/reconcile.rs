//! Activate-version reconciliation.
//!
//! Runs only after the triggering batch's rows are durably committed; a
//! crash between load and reconciliation leaves the old rows visible rather
//! than orphaning the new ones. Each reconciliation is a single statement,
//! atomic under the backend's transaction.

use crate::error::{Result, SinkError};
use crate::planner::{TableDefinition, META_DELETED_AT, META_TABLE_VERSION};
use chrono::Utc;
use streambed_db::{qualified_table, quote_ident, TargetDb};
use streambed_protocol::TargetConfig;
use tracing::{debug, info};

/// Per-stream version state.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VersionState {
    active: Option<i64>,
    last_loaded: Option<i64>,
}

impl VersionState {
    pub(crate) fn record_loaded(&mut self, version: i64) {
        self.last_loaded = Some(version);
    }

    pub(crate) fn active(&self) -> Option<i64> {
        self.active
    }
}

/// Outcome of an activate-version signal.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileSummary {
    pub version: i64,
    /// Rows removed (hard delete) or newly marked (soft delete)
    pub rows_affected: u64,
    pub hard_deleted: bool,
}

pub(crate) async fn activate(
    db: &TargetDb,
    config: &TargetConfig,
    definition: &TableDefinition,
    state: &mut VersionState,
    version: i64,
) -> Result<ReconcileSummary> {
    if !config.activate_version {
        return Err(SinkError::Config(format!(
            "received an activate-version signal for stream '{}' but activate_version is disabled",
            definition.stream()
        )));
    }

    if let Some(active) = state.active {
        if version == active {
            debug!(stream = definition.stream(), version, "Version already active");
            return Ok(ReconcileSummary {
                version,
                rows_affected: 0,
                hard_deleted: config.hard_delete,
            });
        }
        if version < active {
            return Err(SinkError::Config(format!(
                "activate-version {} for stream '{}' is older than the active version {}",
                version,
                definition.stream(),
                active
            )));
        }
    }
    if state.last_loaded != Some(version) {
        return Err(SinkError::Config(format!(
            "activate-version {} for stream '{}' has no matching loaded batch",
            version,
            definition.stream()
        )));
    }

    let table = qualified_table(db.target_schema(), definition.stream());
    let rows_affected = if config.hard_delete {
        let sql = format!(
            "DELETE FROM {} WHERE {} IS NOT ?",
            table,
            quote_ident(META_TABLE_VERSION)
        );
        sqlx::query(&sql)
            .bind(version)
            .execute(db.pool())
            .await?
            .rows_affected()
    } else {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} IS NOT ? AND {} IS NULL",
            table,
            quote_ident(META_DELETED_AT),
            quote_ident(META_TABLE_VERSION),
            quote_ident(META_DELETED_AT)
        );
        sqlx::query(&sql)
            .bind(Utc::now())
            .bind(version)
            .execute(db.pool())
            .await?
            .rows_affected()
    };

    state.active = Some(version);
    info!(
        stream = definition.stream(),
        version,
        rows_affected,
        hard_delete = config.hard_delete,
        "Version activated"
    );

    Ok(ReconcileSummary {
        version,
        rows_affected,
        hard_deleted: config.hard_delete,
    })
}
