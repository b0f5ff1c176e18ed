//! Target configuration.
//!
//! Settings that couple (`activate_version` needs `add_record_metadata`) are
//! checked once, up front, by [`TargetConfig::validate`] - misconfiguration
//! is a startup error, never a per-record one.

use crate::types::LoadMethod;
use serde::Deserialize;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("activate_version requires add_record_metadata to be enabled")]
    ActivateVersionWithoutMetadata,

    #[error("batch_size_rows must be greater than zero")]
    ZeroBatchSize,
}

/// Caller-supplied configuration for a load target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Schema the stream tables live in
    pub default_target_schema: String,
    pub load_method: LoadMethod,
    /// Whether activate-version signals are honored; requires
    /// `add_record_metadata`
    pub activate_version: bool,
    /// On version activation: physically delete superseded rows instead of
    /// stamping `_sdc_deleted_at`
    pub hard_delete: bool,
    /// Add `_sdc_*` metadata columns to every table
    pub add_record_metadata: bool,
    /// Interpret a declared string contentEncoding (base16) as binary.
    /// Off by default: misdeclared encodings would otherwise lose data.
    pub interpret_content_encoding: bool,
    /// Upper bound on rows per transaction; larger inputs are split into
    /// sequential sub-batches
    pub batch_size_rows: Option<usize>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            default_target_schema: "main".to_string(),
            load_method: LoadMethod::default(),
            activate_version: true,
            hard_delete: false,
            add_record_metadata: true,
            interpret_content_encoding: false,
            batch_size_rows: None,
        }
    }
}

impl TargetConfig {
    /// Check cross-setting invariants. Call before processing any records.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.activate_version && !self.add_record_metadata {
            return Err(ConfigError::ActivateVersionWithoutMetadata);
        }
        if self.batch_size_rows == Some(0) {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TargetConfig::default().validate().is_ok());
    }

    #[test]
    fn activate_version_without_metadata_is_rejected() {
        let config = TargetConfig {
            activate_version: true,
            add_record_metadata: false,
            ..TargetConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ActivateVersionWithoutMetadata)
        );
    }

    #[test]
    fn disabling_both_version_settings_is_valid() {
        let config = TargetConfig {
            activate_version: false,
            add_record_metadata: false,
            ..TargetConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = TargetConfig {
            batch_size_rows: Some(0),
            ..TargetConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: TargetConfig = serde_json::from_str(
            r#"{"default_target_schema": "analytics", "load_method": "upsert"}"#,
        )
        .unwrap();
        assert_eq!(config.default_target_schema, "analytics");
        assert_eq!(config.load_method, LoadMethod::Upsert);
        assert!(config.activate_version);
        assert!(!config.hard_delete);
        assert!(config.add_record_metadata);
        assert!(!config.interpret_content_encoding);
        assert_eq!(config.batch_size_rows, None);
    }
}
