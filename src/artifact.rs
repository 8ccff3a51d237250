//! Artifact references passed between pipeline steps.
//!
//! An artifact reference is an opaque `name:version` string (or a bare `name`,
//! meaning the most recently produced version). The orchestrator never opens
//! artifacts; it only hands references from the configuration to the runner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ArtifactError;

/// Version alias used by the artifact store for the most recent version.
pub const LATEST: &str = "latest";

/// Reference to a named, optionally versioned artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactReference {
    name: String,
    version: Option<String>,
}

impl ArtifactReference {
    /// Creates a reference to the latest version of `name`.
    pub fn latest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Creates a reference to a specific version (or alias) of `name`.
    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The explicit version, if the reference carried one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The version the artifact store will resolve, `latest` when unspecified.
    pub fn effective_version(&self) -> &str {
        self.version.as_deref().unwrap_or(LATEST)
    }
}

impl FromStr for ArtifactReference {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ArtifactError::Empty);
        }

        // Names may contain path-like prefixes (entity/project/name) but never ':'.
        match s.rsplit_once(':') {
            Some((name, _)) if name.is_empty() => Err(ArtifactError::EmptyName(s.to_string())),
            Some((_, version)) if version.is_empty() => {
                Err(ArtifactError::EmptyVersion(s.to_string()))
            }
            Some((name, version)) => Ok(Self::versioned(name, version)),
            None => Ok(Self::latest(s)),
        }
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Serialize for ArtifactReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ArtifactReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
