//! Command-line overrides of configuration values.
//!
//! Syntax follows dotted `key=value` assignments:
//!
//! - `key=value` replaces an existing key
//! - `+key=value` adds a key that must not exist yet
//! - `++key=value` sets the key whether or not it exists
//!
//! The value is parsed as a YAML scalar, so `100` is an integer, `0.2` a float
//! and `download,basic_cleaning` a plain string.

use std::str::FromStr;

use serde_yaml::{Mapping, Value};

use super::{split_path, value_kind};
use crate::error::ConfigError;

/// How an override treats an existing or missing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    /// `key=value`: the key must already exist.
    Set,
    /// `+key=value`: the key must not exist.
    Add,
    /// `++key=value`: set unconditionally.
    Upsert,
}

/// A single `key=value` configuration override.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub path: String,
    pub value: Value,
    pub mode: OverrideMode,
}

impl Override {
    /// Applies the override to a configuration tree.
    pub(crate) fn apply(&self, root: &mut Value) -> Result<(), ConfigError> {
        let segments = split_path(&self.path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        };

        let mut current = root;
        for segment in parents {
            let map = self.as_mapping(current)?;
            if !map.contains_key(*segment) && self.mode == OverrideMode::Set {
                return Err(ConfigError::UnknownOverrideKey(self.path.clone()));
            }
            current = map
                .entry(Value::String(segment.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }

        let map = self.as_mapping(current)?;
        match (self.mode, map.contains_key(*last)) {
            (OverrideMode::Set, false) => Err(ConfigError::UnknownOverrideKey(self.path.clone())),
            (OverrideMode::Add, true) => Err(ConfigError::OverrideConflict(self.path.clone())),
            _ => {
                map.insert(Value::String(last.to_string()), self.value.clone());
                Ok(())
            }
        }
    }

    fn as_mapping<'a>(&self, value: &'a mut Value) -> Result<&'a mut Mapping, ConfigError> {
        match value {
            Value::Mapping(map) => Ok(map),
            other => Err(ConfigError::TypeMismatch {
                path: self.path.clone(),
                expected: "mapping",
                found: value_kind(other),
            }),
        }
    }
}

impl FromStr for Override {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, rest) = if let Some(rest) = s.strip_prefix("++") {
            (OverrideMode::Upsert, rest)
        } else if let Some(rest) = s.strip_prefix('+') {
            (OverrideMode::Add, rest)
        } else {
            (OverrideMode::Set, s)
        };

        let (key, raw) = rest
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidOverride(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() || split_path(key).is_err() {
            return Err(ConfigError::InvalidOverride(s.to_string()));
        }

        Ok(Self {
            path: key.to_string(),
            value: parse_value(raw),
            mode,
        })
    }
}

/// Parses an override value as YAML, falling back to the raw string.
fn parse_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::String(raw.to_string());
    }
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
