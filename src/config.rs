//! Settings for the annotation pipeline.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// History store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of the lookup history.
    pub max_rows: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_rows: 999 }
    }
}

/// Built-in provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Invalid numbers a directory lookup will query one by one per cycle.
    pub max_supported_invalid_numbers: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_supported_invalid_numbers: 5,
        }
    }
}

/// Refresh worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: usize,
    /// Maximum queued refresh requests.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub history: HistoryConfig,
    pub lookup: LookupConfig,
    pub runtime: RuntimeConfig,
}

impl AnnotationConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Rejects zero capacities.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let checks = [
            ("history.max_rows", self.history.max_rows),
            ("runtime.workers", self.runtime.workers),
            ("runtime.queue_capacity", self.runtime.queue_capacity),
        ];
        for (field, actual) in checks {
            if actual == 0 {
                return Err(ConfigError::BelowMinimum {
                    field: field.to_string(),
                    min: 1,
                    actual: 0,
                });
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = AnnotationConfig::from_json("{}").unwrap();
        assert_eq!(config, AnnotationConfig::default());
        assert_eq!(config.history.max_rows, 999);
        assert_eq!(config.lookup.max_supported_invalid_numbers, 5);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let json = r#"{"runtime": {"workers": 3}, "history": {"max_rows": 50}}"#;
        let config = AnnotationConfig::from_json(json).unwrap();
        assert_eq!(config.runtime.workers, 3);
        assert_eq!(config.runtime.queue_capacity, 16);
        assert_eq!(config.history.max_rows, 50);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = AnnotationConfig::from_json(r#"{"runtime": {"queue_capacity": 0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::BelowMinimum { ref field, .. } if field == "runtime.queue_capacity"
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            AnnotationConfig::from_json("{not json"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AnnotationConfig::load("/nonexistent/annotation.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
