//! JSON-Schema fragments and record batches as received from the upstream
//! record source.
//!
//! These types deserialize the relevant subset of real JSON Schema: `type`
//! as a single string or an array of strings, `format`, `contentEncoding`,
//! and `anyOf`. Everything else in a fragment is ignored. Unknown type names
//! are kept as [`JsonType::Unrecognized`] so they satisfy nothing during
//! resolution instead of failing deserialization.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One record: property name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// JSON Schema primitive type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    /// Any type name this engine does not know; satisfies no column type
    #[serde(other)]
    Unrecognized,
}

/// A JSON-Schema fragment describing one property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertySchema {
    /// Declared JSON types; `None` when the fragment has no `type` keyword
    #[serde(
        rename = "type",
        deserialize_with = "type_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub types: Option<Vec<JsonType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "contentEncoding", skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(rename = "anyOf", skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<PropertySchema>,
}

impl PropertySchema {
    /// Fragment declaring a single JSON type.
    pub fn of(ty: JsonType) -> Self {
        Self {
            types: Some(vec![ty]),
            ..Self::default()
        }
    }

    /// Fragment declaring a union of JSON types.
    pub fn of_types(types: impl IntoIterator<Item = JsonType>) -> Self {
        Self {
            types: Some(types.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fragment with no `type` keyword at all.
    pub fn untyped() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    /// Whether the fragment's `type` keyword includes `ty`.
    pub fn declares(&self, ty: JsonType) -> bool {
        self.types.as_ref().is_some_and(|types| types.contains(&ty))
    }
}

/// Accept `"type": "string"` as well as `"type": ["string", "null"]`.
fn type_list<'de, D>(deserializer: D) -> Result<Option<Vec<JsonType>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(JsonType),
        Many(Vec<JsonType>),
    }

    Ok(Some(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(ty) => vec![ty],
        OneOrMany::Many(types) => types,
    }))
}

/// A stream's schema: ordered property map plus declared key properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSchema {
    pub properties: IndexMap<String, PropertySchema>,
    pub key_properties: Vec<String>,
}

impl StreamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn with_key_properties<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_properties = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// An ordered batch of records for one stream, optionally tagged with the
/// logical version its rows belong to and the upstream extraction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            version: None,
            extracted_at: None,
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_extracted_at(mut self, extracted_at: DateTime<Utc>) -> Self {
        self.extracted_at = Some(extracted_at);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_type_string_deserializes() {
        let schema: PropertySchema = serde_json::from_value(json!({"type": "string"})).unwrap();
        assert_eq!(schema.types, Some(vec![JsonType::String]));
        assert!(schema.format.is_none());
    }

    #[test]
    fn type_array_with_format_deserializes() {
        let schema: PropertySchema =
            serde_json::from_value(json!({"type": ["string", "null"], "format": "date-time"}))
                .unwrap();
        assert!(schema.declares(JsonType::String));
        assert!(schema.declares(JsonType::Null));
        assert_eq!(schema.format.as_deref(), Some("date-time"));
    }

    #[test]
    fn content_encoding_is_read() {
        let schema: PropertySchema =
            serde_json::from_value(json!({"type": "string", "contentEncoding": "base16"})).unwrap();
        assert_eq!(schema.content_encoding.as_deref(), Some("base16"));
    }

    #[test]
    fn unknown_type_names_are_tolerated() {
        let schema: PropertySchema =
            serde_json::from_value(json!({"type": ["string", "decimal128"]})).unwrap();
        assert!(schema.declares(JsonType::String));
        assert!(schema.declares(JsonType::Unrecognized));
    }

    #[test]
    fn missing_type_keyword_is_untyped() {
        let schema: PropertySchema = serde_json::from_value(json!({"maxLength": 32})).unwrap();
        assert!(schema.types.is_none());
    }

    #[test]
    fn any_of_branches_deserialize() {
        let schema: PropertySchema = serde_json::from_value(json!({
            "anyOf": [
                {"type": "string", "format": "date-time"},
                {"type": "null"}
            ]
        }))
        .unwrap();
        assert_eq!(schema.any_of.len(), 2);
        assert!(schema.types.is_none());
    }

    #[test]
    fn stream_schema_preserves_property_order() {
        let schema: StreamSchema = serde_json::from_value(json!({
            "properties": {
                "zeta": {"type": "integer"},
                "alpha": {"type": "string"},
                "mid": {"type": "boolean"}
            },
            "key_properties": ["zeta"]
        }))
        .unwrap();
        let names: Vec<&str> = schema.properties.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(schema.key_properties, vec!["zeta"]);
    }
}
