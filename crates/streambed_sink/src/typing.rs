//! JSON Schema property to column type resolution.
//!
//! A property may declare several JSON types; the resolver walks a fixed
//! priority list and returns the highest-priority entry the schema
//! satisfies, so the result is always exactly one [`ColumnType`] - never a
//! union or variant column.

use crate::encoding::is_binary_encoding;
use streambed_protocol::{ColumnType, JsonType, PropertySchema};

const TEMPORAL_FORMATS: &[&str] = &["date-time", "date", "time"];

/// Resolve a property schema to exactly one column type. Pure function of
/// its inputs.
pub fn resolve(schema: &PropertySchema, interpret_content_encoding: bool) -> ColumnType {
    if schema.types.is_none() {
        if !schema.any_of.is_empty() {
            // Each branch resolves on its own; the best (lowest) one wins.
            return schema
                .any_of
                .iter()
                .map(|branch| resolve(branch, interpret_content_encoding))
                .min()
                .unwrap_or(ColumnType::NoType);
        }
        // No usable type info at all: store as plain text.
        return ColumnType::Text;
    }

    let format = schema.format.as_deref();
    let binary = interpret_content_encoding
        && schema
            .content_encoding
            .as_deref()
            .is_some_and(is_binary_encoding);

    if binary && schema.declares(JsonType::String) {
        ColumnType::Bytea
    } else if schema.declares(JsonType::Array) {
        ColumnType::ArrayOfJson
    } else if schema.declares(JsonType::Object) {
        ColumnType::Json
    } else if schema.declares(JsonType::String)
        && !format.is_some_and(|f| TEMPORAL_FORMATS.contains(&f))
    {
        ColumnType::Text
    } else if schema.declares(JsonType::String) && format == Some("date-time") {
        ColumnType::Timestamp
    } else if schema.declares(JsonType::String) && format == Some("date") {
        ColumnType::Date
    } else if schema.declares(JsonType::String) && format == Some("time") {
        ColumnType::Time
    } else if schema.declares(JsonType::Number) {
        ColumnType::Decimal
    } else if schema.declares(JsonType::Integer) {
        ColumnType::BigInt
    } else if schema.declares(JsonType::Boolean) {
        ColumnType::Boolean
    } else {
        ColumnType::NoType
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streambed_protocol::JsonType::*;

    fn resolve_plain(schema: &PropertySchema) -> ColumnType {
        resolve(schema, false)
    }

    #[test]
    fn single_types_resolve_directly() {
        assert_eq!(resolve_plain(&PropertySchema::of(String)), ColumnType::Text);
        assert_eq!(resolve_plain(&PropertySchema::of(Integer)), ColumnType::BigInt);
        assert_eq!(resolve_plain(&PropertySchema::of(Number)), ColumnType::Decimal);
        assert_eq!(resolve_plain(&PropertySchema::of(Boolean)), ColumnType::Boolean);
        assert_eq!(resolve_plain(&PropertySchema::of(Object)), ColumnType::Json);
        assert_eq!(resolve_plain(&PropertySchema::of(Array)), ColumnType::ArrayOfJson);
    }

    #[test]
    fn string_beats_integer() {
        let schema = PropertySchema::of_types([String, Integer]);
        assert_eq!(resolve_plain(&schema), ColumnType::Text);
    }

    #[test]
    fn array_wins_regardless_of_other_declared_types() {
        let schema = PropertySchema::of_types([String, Integer, Array, Object]);
        assert_eq!(resolve_plain(&schema), ColumnType::ArrayOfJson);
    }

    #[test]
    fn temporal_formats_resolve_to_their_types() {
        let ts = PropertySchema::of(String).with_format("date-time");
        assert_eq!(resolve_plain(&ts), ColumnType::Timestamp);
        let date = PropertySchema::of_types([String, Null]).with_format("date");
        assert_eq!(resolve_plain(&date), ColumnType::Date);
        let time = PropertySchema::of(String).with_format("time");
        assert_eq!(resolve_plain(&time), ColumnType::Time);
    }

    #[test]
    fn unrecognized_format_is_plain_text() {
        let schema = PropertySchema::of(String).with_format("uuid");
        assert_eq!(resolve_plain(&schema), ColumnType::Text);
    }

    #[test]
    fn content_encoding_is_opt_in() {
        let schema = PropertySchema::of(String).with_content_encoding("base16");
        assert_eq!(resolve(&schema, false), ColumnType::Text);
        assert_eq!(resolve(&schema, true), ColumnType::Bytea);
    }

    #[test]
    fn unknown_content_encoding_stays_text() {
        let schema = PropertySchema::of(String).with_content_encoding("base64");
        assert_eq!(resolve(&schema, true), ColumnType::Text);
    }

    #[test]
    fn null_only_and_empty_type_sets_resolve_to_notype() {
        assert_eq!(resolve_plain(&PropertySchema::of(Null)), ColumnType::NoType);
        assert_eq!(resolve_plain(&PropertySchema::of_types([])), ColumnType::NoType);
        assert_eq!(
            resolve_plain(&PropertySchema::of(Unrecognized)),
            ColumnType::NoType
        );
    }

    #[test]
    fn untyped_schema_resolves_to_text() {
        assert_eq!(resolve_plain(&PropertySchema::untyped()), ColumnType::Text);
    }

    #[test]
    fn any_of_picks_the_best_branch() {
        let schema = PropertySchema {
            any_of: vec![
                PropertySchema::of(Null),
                PropertySchema::of(String).with_format("date-time"),
            ],
            ..PropertySchema::default()
        };
        assert_eq!(resolve_plain(&schema), ColumnType::Timestamp);
    }

    #[test]
    fn resolution_is_idempotent() {
        let schema = PropertySchema::of_types([String, Integer, Null]).with_format("date-time");
        let first = resolve_plain(&schema);
        assert_eq!(resolve_plain(&schema), first);
    }
}
