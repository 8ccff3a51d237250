//! Parameter maps handed to step runners.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_yaml::Value;

use crate::artifact::ArtifactReference;
use crate::config::value_kind;
use crate::error::ConfigError;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// A file the orchestrator materialized for the step.
    Path(PathBuf),
    Artifact(ArtifactReference),
}

impl ParamValue {
    /// Converts a YAML scalar found at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TypeMismatch` for null, sequences and mappings.
    pub fn from_yaml(path: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) => Ok(ParamValue::Text(s.clone())),
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(ParamValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(ParamValue::Float(f))
                } else {
                    Err(ConfigError::TypeMismatch {
                        path: path.to_string(),
                        expected: "scalar",
                        found: "number out of range",
                    })
                }
            }
            other => Err(ConfigError::TypeMismatch {
                path: path.to_string(),
                expected: "scalar",
                found: value_kind(other),
            }),
        }
    }

    /// Interprets the value as an artifact reference, if it names one.
    pub fn as_artifact(&self) -> Option<ArtifactReference> {
        match self {
            ParamValue::Artifact(reference) => Some(reference.clone()),
            ParamValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(s) => write!(f, "{}", s),
            ParamValue::Integer(i) => write!(f, "{}", i),
            // Keep a decimal point on integral floats so `1.0` does not become `1`.
            ParamValue::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Path(p) => write!(f, "{}", p.display()),
            ParamValue::Artifact(reference) => write!(f, "{}", reference),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<PathBuf> for ParamValue {
    fn from(value: PathBuf) -> Self {
        ParamValue::Path(value)
    }
}

impl From<ArtifactReference> for ParamValue {
    fn from(value: ArtifactReference) -> Self {
        ParamValue::Artifact(value)
    }
}

/// Flat mapping from parameter name to value for one step invocation.
///
/// Ordering carries no meaning; a sorted map keeps command lines and logs
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, ParamValue>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, returning the previous value if one was set.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Renders each parameter as `name=value`.
    pub fn to_assignments(&self) -> Vec<String> {
        self.iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect()
    }
}
