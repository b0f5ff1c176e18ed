//! Table shape planning.
//!
//! A stream's table definition is derived from its schema and evolved batch
//! over batch: columns are only ever added or widened, never dropped or
//! narrowed. Anything outside the widening lattice is a schema conflict the
//! caller must handle; the planner never alters destructively.

use crate::error::{Result, SinkError};
use crate::typing;
use indexmap::IndexMap;
use streambed_db::{qualified_table, quote_ident};
use streambed_protocol::{ColumnType, LoadMethod, StreamSchema, TargetConfig};
use tracing::warn;

/// Extraction timestamp metadata column.
pub const META_EXTRACTED_AT: &str = "_sdc_extracted_at";
/// Batch timestamp metadata column.
pub const META_BATCHED_AT: &str = "_sdc_batched_at";
/// Soft-delete marker metadata column.
pub const META_DELETED_AT: &str = "_sdc_deleted_at";
/// Stream version metadata column.
pub const META_TABLE_VERSION: &str = "_sdc_table_version";

/// The target shape of one stream's table.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    stream: String,
    columns: IndexMap<String, ColumnType>,
    key_properties: Vec<String>,
    // Upsert needs a unique constraint as its conflict target; append-only
    // must tolerate duplicate keys, so the constraint is method-dependent.
    enforce_keys: bool,
    record_metadata: bool,
    version_metadata: bool,
}

impl TableDefinition {
    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns.get(name).copied()
    }

    /// Data columns in declaration order, metadata excluded.
    pub fn data_columns(&self) -> impl Iterator<Item = (&str, ColumnType)> + '_ {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Metadata columns implied by the configuration, in fixed order.
    pub fn metadata_columns(&self) -> Vec<(&'static str, ColumnType)> {
        let mut columns = Vec::new();
        if self.record_metadata {
            columns.push((META_EXTRACTED_AT, ColumnType::Timestamp));
            columns.push((META_BATCHED_AT, ColumnType::Timestamp));
        }
        if self.version_metadata {
            columns.push((META_DELETED_AT, ColumnType::Timestamp));
            columns.push((META_TABLE_VERSION, ColumnType::BigInt));
        }
        columns
    }

    /// Every column, data first then metadata.
    pub fn all_columns(&self) -> Vec<(&str, ColumnType)> {
        self.data_columns()
            .chain(self.metadata_columns())
            .collect()
    }

    /// Column names in insert order (data then metadata).
    pub fn insert_columns(&self) -> Vec<&str> {
        self.all_columns().into_iter().map(|(name, _)| name).collect()
    }

    pub fn has_record_metadata(&self) -> bool {
        self.record_metadata
    }

    pub fn has_version_metadata(&self) -> bool {
        self.version_metadata
    }

    /// CREATE TABLE statement for this definition.
    pub fn create_table_sql(&self, target_schema: &str) -> String {
        let mut defs: Vec<String> = Vec::new();
        for (name, ty) in &self.columns {
            let not_null = if self.enforce_keys && self.key_properties.contains(name) {
                " NOT NULL"
            } else {
                ""
            };
            defs.push(format!("{} {}{}", quote_ident(name), ty.sqlite_type(), not_null));
        }
        for (name, ty) in self.metadata_columns() {
            defs.push(format!("{} {}", quote_ident(name), ty.sqlite_type()));
        }
        if self.enforce_keys && !self.key_properties.is_empty() {
            let keys: Vec<String> = self.key_properties.iter().map(|k| quote_ident(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            qualified_table(target_schema, &self.stream),
            defs.join(", ")
        )
    }

    /// ALTER TABLE statement adding one column.
    pub fn add_column_sql(&self, target_schema: &str, name: &str, ty: ColumnType) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            qualified_table(target_schema, &self.stream),
            quote_ident(name),
            ty.sqlite_type()
        )
    }
}

/// A planned table change set.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// Full target definition
    pub definition: TableDefinition,
    /// Columns the previous definition did not have
    pub added: Vec<(String, ColumnType)>,
    /// Columns whose declared type moved up the lattice: (name, from, to)
    pub widened: Vec<(String, ColumnType, ColumnType)>,
}

/// Plan the table for a stream schema against the previously known
/// definition, if any.
pub fn plan(
    stream: &str,
    schema: &StreamSchema,
    previous: Option<&TableDefinition>,
    config: &TargetConfig,
) -> Result<TablePlan> {
    let mut columns = previous
        .map(|prev| prev.columns.clone())
        .unwrap_or_default();
    let mut added = Vec::new();
    let mut widened = Vec::new();

    for (name, property) in &schema.properties {
        let resolved = typing::resolve(property, config.interpret_content_encoding);
        match columns.get(name).copied() {
            None => {
                if previous.is_some() {
                    added.push((name.clone(), resolved));
                }
                columns.insert(name.clone(), resolved);
            }
            Some(existing) if resolved == existing || resolved.widens_to(existing) => {}
            Some(existing) if existing.widens_to(resolved) => {
                widened.push((name.clone(), existing, resolved));
                columns.insert(name.clone(), resolved);
            }
            Some(existing) => {
                return Err(SinkError::SchemaConflict {
                    stream: stream.to_string(),
                    column: name.clone(),
                    existing,
                    requested: resolved,
                });
            }
        }
    }

    let key_properties = match previous {
        Some(prev) => {
            if prev.key_properties() != schema.key_properties.as_slice() {
                warn!(
                    stream,
                    "Ignoring changed key properties; a table's keys are fixed at creation"
                );
            }
            prev.key_properties().to_vec()
        }
        None => {
            for key in &schema.key_properties {
                if !columns.contains_key(key) {
                    return Err(SinkError::Config(format!(
                        "key property '{}' is not defined in the schema for stream '{}'",
                        key, stream
                    )));
                }
            }
            schema.key_properties.clone()
        }
    };

    let definition = TableDefinition {
        stream: stream.to_string(),
        columns,
        key_properties,
        enforce_keys: config.load_method == LoadMethod::Upsert,
        record_metadata: config.add_record_metadata,
        version_metadata: config.add_record_metadata && config.activate_version,
    };

    Ok(TablePlan {
        definition,
        added,
        widened,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use streambed_protocol::{JsonType, PropertySchema};

    fn config() -> TargetConfig {
        TargetConfig::default()
    }

    fn schema_v1() -> StreamSchema {
        StreamSchema::new()
            .property("id", PropertySchema::of(JsonType::Integer))
            .property(
                "name",
                PropertySchema::of_types([JsonType::String, JsonType::Null]),
            )
            .with_key_properties(["id"])
    }

    #[test]
    fn first_plan_has_no_additions() {
        let plan = plan("users", &schema_v1(), None, &config()).unwrap();
        assert!(plan.added.is_empty());
        assert!(plan.widened.is_empty());
        assert_eq!(
            plan.definition.column_type("id"),
            Some(ColumnType::BigInt)
        );
        assert_eq!(plan.definition.key_properties(), vec!["id".to_string()]);
    }

    fn metadata_names(definition: &TableDefinition) -> Vec<&'static str> {
        definition
            .metadata_columns()
            .iter()
            .map(|(name, _)| *name)
            .collect()
    }

    #[test]
    fn metadata_columns_follow_configuration() {
        let full = plan("users", &schema_v1(), None, &config()).unwrap();
        assert_eq!(
            metadata_names(&full.definition),
            vec![
                META_EXTRACTED_AT,
                META_BATCHED_AT,
                META_DELETED_AT,
                META_TABLE_VERSION
            ]
        );

        let bare = TargetConfig {
            activate_version: false,
            add_record_metadata: false,
            ..TargetConfig::default()
        };
        let stripped = plan("users", &schema_v1(), None, &bare).unwrap();
        assert!(stripped.definition.metadata_columns().is_empty());

        let no_version = TargetConfig {
            activate_version: false,
            ..TargetConfig::default()
        };
        let stamped = plan("users", &schema_v1(), None, &no_version).unwrap();
        assert_eq!(
            metadata_names(&stamped.definition),
            vec![META_EXTRACTED_AT, META_BATCHED_AT]
        );
    }

    #[test]
    fn new_properties_become_additions() {
        let first = plan("users", &schema_v1(), None, &config()).unwrap();
        let evolved = schema_v1().property("age", PropertySchema::of(JsonType::Integer));
        let second = plan("users", &evolved, Some(&first.definition), &config()).unwrap();
        assert_eq!(second.added, vec![("age".to_string(), ColumnType::BigInt)]);
    }

    #[test]
    fn columns_survive_schemas_that_omit_them() {
        let first = plan("users", &schema_v1(), None, &config()).unwrap();
        let shrunk = StreamSchema::new()
            .property("id", PropertySchema::of(JsonType::Integer))
            .with_key_properties(["id"]);
        let second = plan("users", &shrunk, Some(&first.definition), &config()).unwrap();
        assert_eq!(second.definition.column_type("name"), Some(ColumnType::Text));
        assert!(second.added.is_empty());
    }

    #[test]
    fn notype_columns_widen_when_a_real_type_arrives() {
        let null_only = StreamSchema::new().property("extra", PropertySchema::of(JsonType::Null));
        let first = plan("users", &null_only, None, &config()).unwrap();
        assert_eq!(first.definition.column_type("extra"), Some(ColumnType::NoType));

        let typed = StreamSchema::new().property("extra", PropertySchema::of(JsonType::Integer));
        let second = plan("users", &typed, Some(&first.definition), &config()).unwrap();
        assert_eq!(second.definition.column_type("extra"), Some(ColumnType::BigInt));
        assert_eq!(
            second.widened,
            vec![("extra".to_string(), ColumnType::NoType, ColumnType::BigInt)]
        );
    }

    #[test]
    fn wider_existing_column_needs_no_change() {
        let text = StreamSchema::new().property("v", PropertySchema::of(JsonType::String));
        let first = plan("s", &text, None, &config()).unwrap();
        let ts = StreamSchema::new().property(
            "v",
            PropertySchema::of(JsonType::String).with_format("date-time"),
        );
        let second = plan("s", &ts, Some(&first.definition), &config()).unwrap();
        assert_eq!(second.definition.column_type("v"), Some(ColumnType::Text));
        assert!(second.widened.is_empty());
    }

    #[test]
    fn incompatible_types_conflict() {
        let boolean = StreamSchema::new().property("flag", PropertySchema::of(JsonType::Boolean));
        let first = plan("s", &boolean, None, &config()).unwrap();
        let object = StreamSchema::new().property("flag", PropertySchema::of(JsonType::Object));
        let err = plan("s", &object, Some(&first.definition), &config()).unwrap_err();
        match err {
            SinkError::SchemaConflict {
                column,
                existing,
                requested,
                ..
            } => {
                assert_eq!(column, "flag");
                assert_eq!(existing, ColumnType::Boolean);
                assert_eq!(requested, ColumnType::Json);
            }
            other => panic!("expected schema conflict, got {other}"),
        }
    }

    #[test]
    fn key_property_must_exist_in_schema() {
        let schema = StreamSchema::new()
            .property("id", PropertySchema::of(JsonType::Integer))
            .with_key_properties(["missing"]);
        assert!(matches!(
            plan("s", &schema, None, &config()),
            Err(SinkError::Config(_))
        ));
    }

    #[test]
    fn upsert_tables_get_a_primary_key() {
        let upsert = TargetConfig {
            load_method: LoadMethod::Upsert,
            ..TargetConfig::default()
        };
        let plan = plan("users", &schema_v1(), None, &upsert).unwrap();
        let sql = plan.definition.create_table_sql("main");
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "main"."users""#));
        assert!(sql.contains(r#""id" BIGINT NOT NULL"#));
        assert!(sql.contains(r#""name" TEXT"#));
        assert!(sql.contains(r#""_sdc_extracted_at" TIMESTAMP"#));
        assert!(sql.contains(r#""_sdc_table_version" BIGINT"#));
        assert!(sql.contains(r#"PRIMARY KEY ("id")"#));
    }

    #[test]
    fn append_only_tables_skip_the_key_constraint() {
        let plan = plan("users", &schema_v1(), None, &config()).unwrap();
        let sql = plan.definition.create_table_sql("main");
        assert!(sql.contains(r#""id" BIGINT"#));
        assert!(!sql.contains("PRIMARY KEY"));
        assert!(!sql.contains("NOT NULL"));
    }
}
