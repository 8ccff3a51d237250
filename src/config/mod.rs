//! Hierarchical pipeline configuration.
//!
//! The configuration is a YAML document grouped into sections:
//!
//! - `main`: project identity, experiment group, component repository, step selection
//! - `etl`: extraction thresholds (`sample`, `min_price`, `max_price`)
//! - `parameters`: per-step artifact names, types and descriptions
//! - `modeling`: split ratios, seed, stratification key, `random_forest` hyperparameters
//! - `data_check`: validation thresholds
//!
//! Values are looked up by dotted path (`modeling.random_forest.max_depth`).
//! The resolver never supplies defaults; callers that have a default use
//! [`PipelineConfig::get`] and fall back themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! use mlforge::config::{Override, PipelineConfig};
//!
//! let overrides = vec!["main.steps=download,basic_cleaning".parse::<Override>()?];
//! let config = PipelineConfig::load("config.yaml", &overrides)?;
//!
//! let min_price = config.resolve_scalar("etl.min_price")?;
//! ```

mod overrides;

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::artifact::ArtifactReference;
use crate::error::ConfigError;
use crate::pipeline::params::ParamValue;

pub use overrides::{Override, OverrideMode};

/// Read-only view over a loaded pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    root: Value,
    source: Option<PathBuf>,
}

impl PipelineConfig {
    /// Parses a configuration document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Yaml` on malformed YAML and
    /// `ConfigError::InvalidDocument` if the top level is not a mapping.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(root)
    }

    /// Wraps an already-parsed YAML value.
    pub fn from_value(root: Value) -> Result<Self, ConfigError> {
        match root {
            Value::Mapping(_) => Ok(Self { root, source: None }),
            other => Err(ConfigError::InvalidDocument(value_kind(&other))),
        }
    }

    /// Loads a configuration file and applies command-line overrides in order.
    pub fn load(path: impl AsRef<Path>, overrides: &[Override]) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&content)?.with_overrides(overrides)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Applies overrides, consuming the configuration.
    ///
    /// Overrides are applied during loading only; once handed to the
    /// orchestrator the configuration is never mutated.
    pub fn with_overrides(mut self, overrides: &[Override]) -> Result<Self, ConfigError> {
        for item in overrides {
            item.apply(&mut self.root)?;
        }
        Ok(self)
    }

    /// Path of the file this configuration was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Resolves a dotted path to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingConfigKey` naming the first absent segment.
    pub fn resolve(&self, path: &str) -> Result<&Value, ConfigError> {
        let mut current = &self.root;
        for segment in split_path(path)? {
            current = match current {
                Value::Mapping(map) => map.get(segment),
                _ => None,
            }
            .ok_or_else(|| ConfigError::MissingConfigKey {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Looks up a dotted path, returning `None` when any segment is absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.resolve(path).ok()
    }

    /// Returns true if the dotted path resolves.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Resolves a path that must hold a string.
    pub fn resolve_str(&self, path: &str) -> Result<&str, ConfigError> {
        match self.resolve(path)? {
            Value::String(s) => Ok(s),
            other => Err(ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "string",
                found: value_kind(other),
            }),
        }
    }

    /// Resolves a path that must hold a scalar (string, number or boolean).
    pub fn resolve_scalar(&self, path: &str) -> Result<ParamValue, ConfigError> {
        ParamValue::from_yaml(path, self.resolve(path)?)
    }

    /// Resolves a path holding an artifact reference (`name` or `name:version`).
    pub fn resolve_artifact(&self, path: &str) -> Result<ArtifactReference, ConfigError> {
        self.resolve_str(path)?
            .parse()
            .map_err(|source| ConfigError::InvalidArtifactReference {
                path: path.to_string(),
                source,
            })
    }

    /// Resolves a sub-tree and converts it to a JSON document.
    pub fn resolve_json(&self, path: &str) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(self.resolve(path)?)?)
    }
}

/// Splits a dotted path into its segments, rejecting empty segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Human-readable name of a YAML value's kind, used in error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
main:
  project_name: nyc_airbnb
  experiment_name: development
  steps: all
etl:
  sample: sample1.csv
  min_price: 10
  max_price: 350
modeling:
  test_size: 0.2
  random_forest:
    n_estimators: 100
    max_depth: 15
    oob_score: true
"#;

    fn sample() -> PipelineConfig {
        PipelineConfig::from_yaml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_resolve_nested_values() {
        let config = sample();
        assert_eq!(config.resolve_str("main.project_name").unwrap(), "nyc_airbnb");
        assert_eq!(
            config.resolve_scalar("etl.min_price").unwrap(),
            ParamValue::Integer(10)
        );
        assert_eq!(
            config.resolve_scalar("modeling.test_size").unwrap(),
            ParamValue::Float(0.2)
        );
    }

    #[test]
    fn test_resolve_missing_key_names_segment() {
        let config = sample();
        let err = config.resolve("etl.max_rows").unwrap_err();
        match err {
            ConfigError::MissingConfigKey { path, segment } => {
                assert_eq!(path, "etl.max_rows");
                assert_eq!(segment, "max_rows");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = config.resolve("parameters.basic_cleaning.input_artifact").unwrap_err();
        match err {
            ConfigError::MissingConfigKey { segment, .. } => assert_eq!(segment, "parameters"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_through_scalar_is_missing() {
        let config = sample();
        let err = config.resolve("etl.sample.name").unwrap_err();
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let config = sample();
        let first = config.resolve("modeling.random_forest").unwrap().clone();
        let second = config.resolve("modeling.random_forest").unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(
            config.resolve_scalar("etl.max_price").unwrap(),
            config.resolve_scalar("etl.max_price").unwrap()
        );
    }

    #[test]
    fn test_resolve_str_type_mismatch() {
        let config = sample();
        let err = config.resolve_str("etl.min_price").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TypeMismatch {
                expected: "string",
                found: "number",
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_scalar_rejects_mapping() {
        let config = sample();
        let err = config.resolve_scalar("modeling.random_forest").unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn test_resolve_json_subtree() {
        let config = sample();
        let json = config.resolve_json("modeling.random_forest").unwrap();
        assert_eq!(
            json,
            serde_json::json!({"n_estimators": 100, "max_depth": 15, "oob_score": true})
        );
    }

    #[test]
    fn test_invalid_paths() {
        let config = sample();
        assert!(matches!(config.resolve(""), Err(ConfigError::InvalidPath(_))));
        assert!(matches!(config.resolve("main..steps"), Err(ConfigError::InvalidPath(_))));
    }

    #[test]
    fn test_top_level_must_be_mapping() {
        let err = PipelineConfig::from_yaml_str("- a\n- b\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDocument("sequence")));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let overrides = vec!["main.steps=download".parse::<Override>().unwrap()];
        let config = PipelineConfig::load(&path, &overrides).unwrap();
        assert_eq!(config.resolve_str("main.steps").unwrap(), "download");
        assert_eq!(config.source(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load("/nonexistent/config.yaml", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/config.yaml"));
    }
}
