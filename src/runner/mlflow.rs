//! Runner that executes components with `mlflow run`.
//!
//! Each invocation becomes
//!
//! ```text
//! mlflow run <location> -e <entrypoint> [--version V] [--env-manager M] -P name=value ...
//! ```
//!
//! The tracker group identity is passed to the child through its environment;
//! the orchestrator's own environment is left untouched.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{StepInvocation, StepOutcome, StepRunner};
use crate::error::StepError;
use crate::tracking::{ExperimentTracker, GroupIdentity};

/// Default mlflow executable.
pub const DEFAULT_PROGRAM: &str = "mlflow";

/// Launches steps as `mlflow run` processes.
pub struct MlflowRunner {
    program: String,
    env_manager: Option<String>,
    working_dir: Option<PathBuf>,
    identity: RwLock<Option<GroupIdentity>>,
}

impl MlflowRunner {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            env_manager: None,
            working_dir: None,
            identity: RwLock::new(None),
        }
    }

    /// Sets the executable used instead of `mlflow`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the environment manager passed as `--env-manager` (e.g. `conda`, `local`).
    pub fn with_env_manager(mut self, env_manager: impl Into<String>) -> Self {
        self.env_manager = Some(env_manager.into());
        self
    }

    /// Sets the working directory of step processes.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Builds the argument list for an invocation.
    pub fn command_args(&self, invocation: &StepInvocation) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            invocation.location.clone(),
            "-e".to_string(),
            invocation.entrypoint.clone(),
        ];

        if let Some(version) = &invocation.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }

        if let Some(env_manager) = &self.env_manager {
            args.push("--env-manager".to_string());
            args.push(env_manager.clone());
        }

        for assignment in invocation.parameters.to_assignments() {
            args.push("-P".to_string());
            args.push(assignment);
        }

        args
    }
}

impl Default for MlflowRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepRunner for MlflowRunner {
    async fn execute(&self, invocation: &StepInvocation) -> Result<StepOutcome, StepError> {
        let args = self.command_args(invocation);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args).stdin(Stdio::null());

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        match self.identity.read().await.as_ref() {
            Some(identity) => {
                for (key, value) in identity.env_vars() {
                    cmd.env(key, value);
                }
            }
            None => warn!(
                "No tracker group identity set; step '{}' will run ungrouped",
                invocation.step
            ),
        }

        info!("Launching step '{}' from {}", invocation.step, invocation.location);
        debug!("Command: {} {}", self.program, args.join(" "));

        let start = Instant::now();
        let status = cmd.status().await.map_err(|source| StepError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        debug!(
            "Step '{}' process exited after {:?} with {:?}",
            invocation.step,
            start.elapsed(),
            status.code()
        );

        if status.success() {
            Ok(StepOutcome::new(invocation.outputs.clone()))
        } else {
            Err(StepError::NonZeroExit {
                code: status.code(),
            })
        }
    }
}

#[async_trait]
impl ExperimentTracker for MlflowRunner {
    async fn set_group_identity(&self, identity: &GroupIdentity) {
        info!(
            "Grouping runs under project '{}', group '{}'",
            identity.project, identity.group
        );
        *self.identity.write().await = Some(identity.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactReference;
    use crate::pipeline::params::ParameterMap;

    fn invocation() -> StepInvocation {
        StepInvocation {
            step: "basic_cleaning".to_string(),
            location: "/srv/project/src/basic_cleaning".to_string(),
            entrypoint: "main".to_string(),
            version: None,
            parameters: ParameterMap::new()
                .with(
                    "input_artifact",
                    ArtifactReference::versioned("sample.csv", "latest"),
                )
                .with("min_price", 10i64)
                .with("artifact_description", "Data with outliers removed"),
            outputs: vec![ArtifactReference::latest("clean_sample.csv")],
        }
    }

    #[test]
    fn test_command_args_local() {
        let runner = MlflowRunner::new();
        assert_eq!(
            runner.command_args(&invocation()),
            vec![
                "run",
                "/srv/project/src/basic_cleaning",
                "-e",
                "main",
                "-P",
                "artifact_description=Data with outliers removed",
                "-P",
                "input_artifact=sample.csv:latest",
                "-P",
                "min_price=10",
            ]
        );
    }

    #[test]
    fn test_command_args_with_version_and_env_manager() {
        let runner = MlflowRunner::new().with_env_manager("conda");
        let mut invocation = invocation();
        invocation.location = "https://github.com/example/components#get_data".to_string();
        invocation.version = Some("main".to_string());
        invocation.parameters = ParameterMap::new().with("sample", "sample1.csv");

        assert_eq!(
            runner.command_args(&invocation),
            vec![
                "run",
                "https://github.com/example/components#get_data",
                "-e",
                "main",
                "--version",
                "main",
                "--env-manager",
                "conda",
                "-P",
                "sample=sample1.csv",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_success_reports_declared_outputs() {
        let runner = MlflowRunner::new().with_program("true");
        let outcome = runner.execute(&invocation()).await.unwrap();
        assert_eq!(
            outcome.produced,
            vec![ArtifactReference::latest("clean_sample.csv")]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_nonzero_exit() {
        let runner = MlflowRunner::new().with_program("false");
        let err = runner.execute(&invocation()).await.unwrap_err();
        assert!(matches!(err, StepError::NonZeroExit { code: Some(1) }));
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let runner = MlflowRunner::new().with_program("/nonexistent/bin/mlflow");
        let err = runner.execute(&invocation()).await.unwrap_err();
        match err {
            StepError::Spawn { program, .. } => assert_eq!(program, "/nonexistent/bin/mlflow"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_group_identity_reaches_step_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        // `sh run ...` executes the script named `run` in the working directory.
        std::fs::write(
            dir.path().join("run"),
            "printf '%s\\n' \"$WANDB_PROJECT\" \"$WANDB_RUN_GROUP\" \"$@\" > captured.txt\n",
        )
        .unwrap();

        let runner = MlflowRunner::new()
            .with_program("sh")
            .with_working_dir(dir.path());
        runner
            .set_group_identity(&GroupIdentity::new("nyc_airbnb", "development"))
            .await;
        runner.execute(&invocation()).await.unwrap();

        let captured = std::fs::read_to_string(dir.path().join("captured.txt")).unwrap();
        let lines: Vec<&str> = captured.lines().collect();
        assert_eq!(lines[0], "nyc_airbnb");
        assert_eq!(lines[1], "development");
        assert_eq!(lines[2], "/srv/project/src/basic_cleaning");
        assert!(lines.contains(&"input_artifact=sample.csv:latest"));
    }
}
