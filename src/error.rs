//! Error types for mlforge operations.
//!
//! Defines the error types for the orchestrator subsystems:
//! - Configuration loading, overrides and dotted-path resolution
//! - Step selection
//! - Artifact reference parsing
//! - Scratch workspace lifecycle
//! - Step execution through an external runner

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration key '{path}' (segment '{segment}' not found)")]
    MissingConfigKey { path: String, segment: String },

    #[error("Configuration key '{path}' has wrong type: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid configuration path '{0}'")]
    InvalidPath(String),

    #[error("Invalid artifact reference at '{path}': {source}")]
    InvalidArtifactReference {
        path: String,
        #[source]
        source: ArtifactError,
    },

    #[error("Invalid override '{0}': expected key=value, +key=value or ++key=value")]
    InvalidOverride(String),

    #[error("Cannot override '{0}': key is not in the configuration (use +{0}=... to add it)")]
    UnknownOverrideKey(String),

    #[error("Cannot add '{0}': key already exists (use {0}=... or ++{0}=...)")]
    OverrideConflict(String),

    #[error("Configuration document must be a mapping at the top level, found {0}")]
    InvalidDocument(&'static str),

    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON conversion error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Returns true if this error reports an absent configuration path.
    pub fn is_missing_key(&self) -> bool {
        matches!(self, ConfigError::MissingConfigKey { .. })
    }
}

/// Errors that can occur while interpreting a step selection expression.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Unknown step identifier '{token}' (known steps: {known})")]
    UnknownStepIdentifier { token: String, known: String },
}

/// Errors that can occur while parsing an artifact reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("artifact reference is empty")]
    Empty,

    #[error("artifact reference '{0}' has an empty name")]
    EmptyName(String),

    #[error("artifact reference '{0}' has an empty version")]
    EmptyVersion(String),
}

/// Errors that can occur while managing the scratch workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create scratch workspace: {0}")]
    Create(#[source] std::io::Error),

    #[error("Invalid scratch file name '{0}': must be a plain file name")]
    InvalidFileName(String),

    #[error("Failed to write scratch file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove scratch workspace '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize scratch file: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors reported by a step runner.
///
/// The orchestrator only distinguishes pass from fail; the variants exist so
/// the failure message names what went wrong.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step process exited with {}", exit_label(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("Step failed: {0}")]
    Failed(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_display_names_path_and_segment() {
        let err = ConfigError::MissingConfigKey {
            path: "etl.min_price".to_string(),
            segment: "min_price".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("etl.min_price"));
        assert!(msg.contains("'min_price'"));
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_unknown_step_display() {
        let err = SelectionError::UnknownStepIdentifier {
            token: "bogus_step".to_string(),
            known: "download, basic_cleaning".to_string(),
        };
        assert!(err.to_string().contains("bogus_step"));
        assert!(err.to_string().contains("download, basic_cleaning"));
    }

    #[test]
    fn test_step_error_exit_label() {
        let err = StepError::NonZeroExit { code: Some(2) };
        assert_eq!(err.to_string(), "Step process exited with code 2");

        let err = StepError::NonZeroExit { code: None };
        assert!(err.to_string().contains("signal"));
    }
}
