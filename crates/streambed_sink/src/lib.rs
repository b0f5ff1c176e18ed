//! Streambed load engine.
//!
//! Resolves JSON-Schema-described stream schemas to table shapes, loads
//! record batches with an append-only/upsert/overwrite strategy, and
//! reconciles logical stream versions (soft or hard deletes).
//!
//! # Usage
//!
//! ```rust,ignore
//! use streambed_db::TargetDb;
//! use streambed_protocol::{RecordBatch, TargetConfig};
//! use streambed_sink::Target;
//!
//! let db = TargetDb::open("target.db", "analytics").await?;
//! let mut target = Target::new(db, TargetConfig::default())?;
//!
//! target.apply_schema("users", &schema)?;
//! target.load("users", &RecordBatch::new(records).with_version(2)).await?;
//! target.activate_version("users", 2).await?;
//! ```
//!
//! Each stream's state lives in its own [`StreamSink`]; calls for one stream
//! are applied strictly in call order, while sinks for different streams are
//! independent (`Send`, no shared state beyond the pool) and may be driven
//! from separate tasks via [`Target::detach`].

mod encoding;
mod error;
mod loader;
mod planner;
mod reconcile;
mod typing;

pub use encoding::{decode_hex, is_binary_encoding, DecodeError};
pub use error::{Result, SinkError};
pub use loader::LoadSummary;
pub use planner::{
    plan, TableDefinition, TablePlan, META_BATCHED_AT, META_DELETED_AT, META_EXTRACTED_AT,
    META_TABLE_VERSION,
};
pub use reconcile::ReconcileSummary;
pub use typing::resolve;

use reconcile::VersionState;
use std::collections::HashMap;
use std::sync::Arc;
use streambed_db::TargetDb;
use streambed_protocol::{RecordBatch, StreamSchema, TargetConfig};
use tracing::debug;

/// All state for one stream: table definition, preparedness, version.
#[derive(Debug)]
pub struct StreamSink {
    db: TargetDb,
    config: Arc<TargetConfig>,
    stream: String,
    definition: TableDefinition,
    prepared: bool,
    version: VersionState,
}

impl StreamSink {
    pub fn new(
        db: TargetDb,
        config: Arc<TargetConfig>,
        stream: impl Into<String>,
        schema: &StreamSchema,
    ) -> Result<Self> {
        config.validate()?;
        let stream = stream.into();
        let plan = planner::plan(&stream, schema, None, &config)?;
        Ok(Self {
            db,
            config,
            stream,
            definition: plan.definition,
            prepared: false,
            version: VersionState::default(),
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// Version made current by the last accepted activate-version signal.
    pub fn active_version(&self) -> Option<i64> {
        self.version.active()
    }

    /// Replace the stream's schema. Column additions and widenings take
    /// effect on the next load; conflicts abort here with the table
    /// untouched.
    pub fn apply_schema(&mut self, schema: &StreamSchema) -> Result<()> {
        let plan = planner::plan(&self.stream, schema, Some(&self.definition), &self.config)?;
        for (name, ty) in &plan.added {
            debug!(stream = %self.stream, column = %name, column_type = %ty, "Schema adds column");
        }
        for (name, from, to) in &plan.widened {
            debug!(stream = %self.stream, column = %name, %from, %to, "Column widened");
        }
        if !plan.added.is_empty() {
            self.prepared = false;
        }
        self.definition = plan.definition;
        Ok(())
    }

    /// Load one batch of records using the configured strategy.
    pub async fn load(&mut self, batch: &RecordBatch) -> Result<LoadSummary> {
        if !self.prepared {
            loader::ensure_table(&self.db, &self.definition).await?;
            self.prepared = true;
        }
        let summary = loader::BatchLoader::new(&self.db, &self.config, &self.definition)
            .load(batch)
            .await?;
        if let Some(version) = batch.version {
            self.version.record_loaded(version);
        }
        Ok(summary)
    }

    /// Make `version` the stream's current version: soft-mark or hard-delete
    /// every row that does not belong to it.
    pub async fn activate_version(&mut self, version: i64) -> Result<ReconcileSummary> {
        reconcile::activate(
            &self.db,
            &self.config,
            &self.definition,
            &mut self.version,
            version,
        )
        .await
    }
}

/// Registry of per-stream sinks sharing one database and configuration.
#[derive(Debug)]
pub struct Target {
    db: TargetDb,
    config: Arc<TargetConfig>,
    sinks: HashMap<String, StreamSink>,
}

impl Target {
    /// Validate the configuration and build an empty target. Fails before
    /// any record is processed if the settings are inconsistent or the
    /// database was opened against a different schema than the one the
    /// configuration targets.
    pub fn new(db: TargetDb, config: TargetConfig) -> Result<Self> {
        config.validate()?;
        if db.target_schema() != config.default_target_schema {
            return Err(SinkError::Config(format!(
                "database is attached to schema '{}' but the configuration targets '{}'",
                db.target_schema(),
                config.default_target_schema
            )));
        }
        Ok(Self {
            db,
            config: Arc::new(config),
            sinks: HashMap::new(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    /// Apply a stream's schema: creates the sink on first sight, evolves the
    /// table shape afterwards.
    pub fn apply_schema(&mut self, stream: &str, schema: &StreamSchema) -> Result<()> {
        match self.sinks.get_mut(stream) {
            Some(sink) => sink.apply_schema(schema),
            None => {
                let sink = StreamSink::new(
                    self.db.clone(),
                    Arc::clone(&self.config),
                    stream,
                    schema,
                )?;
                self.sinks.insert(stream.to_string(), sink);
                Ok(())
            }
        }
    }

    pub async fn load(&mut self, stream: &str, batch: &RecordBatch) -> Result<LoadSummary> {
        self.sink_mut(stream)?.load(batch).await
    }

    pub async fn activate_version(
        &mut self,
        stream: &str,
        version: i64,
    ) -> Result<ReconcileSummary> {
        self.sink_mut(stream)?.activate_version(version).await
    }

    /// Detach a stream's sink so it can be driven from its own task.
    pub fn detach(&mut self, stream: &str) -> Option<StreamSink> {
        self.sinks.remove(stream)
    }

    /// Re-attach a sink previously taken with [`Target::detach`].
    pub fn attach(&mut self, sink: StreamSink) {
        self.sinks.insert(sink.stream().to_string(), sink);
    }

    fn sink_mut(&mut self, stream: &str) -> Result<&mut StreamSink> {
        self.sinks.get_mut(stream).ok_or_else(|| {
            SinkError::Config(format!("no schema has been applied for stream '{stream}'"))
        })
    }
}
