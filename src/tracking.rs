//! Experiment tracker seam.
//!
//! All step executions of a run are grouped under one project/group identity.
//! The orchestrator sets that identity once, before the first step runs; the
//! tracker decides how to propagate it (the mlflow runner hands it to each
//! step process as environment).

use async_trait::async_trait;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::ConfigError;

/// Environment variable carrying the tracker project name to step processes.
pub const PROJECT_ENV: &str = "WANDB_PROJECT";

/// Environment variable carrying the run group to step processes.
pub const GROUP_ENV: &str = "WANDB_RUN_GROUP";

/// Project and run group every step execution is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupIdentity {
    pub project: String,
    pub group: String,
}

impl GroupIdentity {
    pub fn new(project: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            group: group.into(),
        }
    }

    /// Reads `main.project_name` and `main.experiment_name`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.resolve_scalar("main.project_name")?.to_string(),
            config.resolve_scalar("main.experiment_name")?.to_string(),
        ))
    }

    /// Environment assignments for a step process.
    pub fn env_vars(&self) -> [(&'static str, &str); 2] {
        [(PROJECT_ENV, &self.project), (GROUP_ENV, &self.group)]
    }
}

/// Receives the grouping identity for a pipeline run.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    /// Called once per run, before any step executes.
    async fn set_group_identity(&self, identity: &GroupIdentity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::from_yaml_str(
            "main:\n  project_name: nyc_airbnb\n  experiment_name: development\n",
        )
        .unwrap();
        let identity = GroupIdentity::from_config(&config).unwrap();
        assert_eq!(identity, GroupIdentity::new("nyc_airbnb", "development"));
        assert_eq!(
            identity.env_vars(),
            [
                ("WANDB_PROJECT", "nyc_airbnb"),
                ("WANDB_RUN_GROUP", "development")
            ]
        );
    }

    #[test]
    fn test_from_config_requires_both_keys() {
        let config = PipelineConfig::from_yaml_str("main:\n  project_name: nyc_airbnb\n").unwrap();
        let err = GroupIdentity::from_config(&config).unwrap_err();
        assert!(err.is_missing_key());
        assert!(err.to_string().contains("main.experiment_name"));
    }
}
