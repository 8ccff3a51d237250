//! Pipeline orchestrator: drives the selected steps of one run.
//!
//! This module provides the `Orchestrator` that coordinates:
//! - Step selection from `main.steps`
//! - Tracker group identity
//! - Per-step parameter mapping and scratch input preparation
//! - Strictly sequential execution through a [`StepRunner`]
//! - Scratch workspace teardown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, SelectionError, StepError, WorkspaceError};
use crate::runner::{StepInvocation, StepRunner};
use crate::tracking::{ExperimentTracker, GroupIdentity};

use super::params::ParamValue;
use super::registry::{self, StepDescriptor};
use super::selector::{select_steps, selection_expression};
use super::state::{ExecutionPlan, PipelineState, StepRecord, TransitionError};
use super::workspace::ScratchWorkspace;

/// Errors that can occur during a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline-wide configuration error (selection, tracker identity).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A step's parameters or scratch inputs could not be resolved.
    #[error("Configuration error in step '{step}': {source}")]
    StepConfig {
        step: String,
        #[source]
        source: ConfigError,
    },

    #[error("Step selection error: {0}")]
    Selection(#[from] SelectionError),

    /// A step ran and failed.
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("State error: {0}")]
    State(#[from] TransitionError),
}

impl PipelineError {
    /// Step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            PipelineError::StepConfig { step, .. } | PipelineError::StepFailed { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }

    /// Returns true if a required configuration path was absent.
    pub fn is_missing_config_key(&self) -> bool {
        match self {
            PipelineError::Config(err) | PipelineError::StepConfig { source: err, .. } => {
                err.is_missing_key()
            }
            _ => false,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: PipelineState,
    pub steps: Vec<StepRecord>,
}

impl PipelineReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>, plan: ExecutionPlan) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            state: plan.state(),
            steps: plan.into_records(),
        }
    }

    /// Identifiers of the steps that ran, in execution order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|record| record.step.as_str()).collect()
    }
}

/// A step as it would be invoked, without running it.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    #[serde(flatten)]
    pub invocation: StepInvocation,
    /// Parameters filled in with scratch files at run time.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scratch_inputs: Vec<&'static str>,
}

/// Runs selected pipeline steps in registry order.
pub struct Orchestrator {
    runner: Arc<dyn StepRunner>,
    tracker: Arc<dyn ExperimentTracker>,
    registry: &'static [StepDescriptor],
    project_root: PathBuf,
    scratch_parent: Option<PathBuf>,
}

impl Orchestrator {
    /// Creates an orchestrator over the built-in step registry.
    ///
    /// Local components resolve against the current directory until
    /// [`with_project_root`](Self::with_project_root) says otherwise.
    pub fn new(runner: Arc<dyn StepRunner>, tracker: Arc<dyn ExperimentTracker>) -> Self {
        Self {
            runner,
            tracker,
            registry: registry::registry(),
            project_root: PathBuf::from("."),
            scratch_parent: None,
        }
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Creates scratch workspaces under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(dir.into());
        self
    }

    /// Resolves `main.steps` to the active step set.
    pub fn select(
        &self,
        config: &PipelineConfig,
    ) -> Result<Vec<&'static StepDescriptor>, PipelineError> {
        let expression = selection_expression(config)?;
        let selected = select_steps(&expression, self.registry)?;
        debug!(
            "Selection '{}' resolved to {:?}",
            expression,
            selected.iter().map(|step| step.id).collect::<Vec<_>>()
        );
        Ok(selected)
    }

    /// Describes every selected step without creating a workspace or
    /// running anything.
    pub fn plan(&self, config: &PipelineConfig) -> Result<Vec<PlannedStep>, PipelineError> {
        self.select(config)?
            .into_iter()
            .map(|step| {
                Ok(PlannedStep {
                    invocation: self.describe(step, config)?,
                    scratch_inputs: step.scratch_inputs.iter().map(|input| input.parameter).collect(),
                })
            })
            .collect()
    }

    /// Runs the selected steps one at a time.
    ///
    /// The first failure aborts the run; later steps are never attempted.
    /// The scratch workspace is removed before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// - `Selection` / `Config` before any step runs
    /// - `StepConfig` when a step's parameters cannot be resolved; that step
    ///   and every later one are skipped
    /// - `StepFailed` when the runner reports failure
    /// - `Workspace` when the scratch directory cannot be created, written or removed
    pub async fn run(&self, config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let selected = self.select(config)?;
        let mut plan = ExecutionPlan::new(selected.iter().map(|step| step.id));

        if selected.is_empty() {
            info!("No steps selected, nothing to run");
            plan.complete()?;
            return Ok(PipelineReport::new(run_id, started_at, plan));
        }

        let identity = GroupIdentity::from_config(config)?;
        self.tracker.set_group_identity(&identity).await;

        let mut workspace = match &self.scratch_parent {
            Some(parent) => ScratchWorkspace::create_in(parent)?,
            None => ScratchWorkspace::create()?,
        };

        info!(
            "Starting run {} with {} step(s): {}",
            run_id,
            selected.len(),
            selected.iter().map(|step| step.id).collect::<Vec<_>>().join(", ")
        );

        let outcome = self
            .execute_steps(&selected, config, &mut plan, &mut workspace)
            .await;

        match (outcome, workspace.close()) {
            (Ok(()), Ok(())) => {}
            (Ok(()), Err(close_err)) => {
                plan.abort();
                return Err(close_err.into());
            }
            (Err(err), Ok(())) => {
                self.log_abort(&err, &plan);
                return Err(err);
            }
            (Err(err), Err(close_err)) => {
                warn!("Failed to clean up scratch workspace: {}", close_err);
                self.log_abort(&err, &plan);
                return Err(err);
            }
        }

        plan.complete()?;
        info!("Run {} completed in {:?}", run_id, start.elapsed());
        Ok(PipelineReport::new(run_id, started_at, plan))
    }

    async fn execute_steps(
        &self,
        selected: &[&'static StepDescriptor],
        config: &PipelineConfig,
        plan: &mut ExecutionPlan,
        workspace: &mut ScratchWorkspace,
    ) -> Result<(), PipelineError> {
        for (index, step) in selected.iter().enumerate() {
            let invocation = match self.prepare(step, config, workspace) {
                Ok(invocation) => invocation,
                Err(err) => {
                    plan.abort_at(index, err.to_string())?;
                    return Err(err);
                }
            };

            plan.start(index)?;
            info!("[{}/{}] Running step '{}'", index + 1, selected.len(), step.id);
            debug!(
                "Parameters for '{}': {}",
                step.id,
                invocation.parameters.to_assignments().join(" ")
            );

            match self.runner.execute(&invocation).await {
                Ok(outcome) => {
                    for artifact in &outcome.produced {
                        debug!("Step '{}' produced {}", step.id, artifact);
                    }
                    plan.succeed(index, outcome.produced)?;
                    info!("Step '{}' succeeded", step.id);
                }
                Err(source) => {
                    plan.fail(index, source.to_string())?;
                    return Err(PipelineError::StepFailed {
                        step: step.id.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Builds the invocation for a step from configuration alone.
    fn describe(
        &self,
        step: &StepDescriptor,
        config: &PipelineConfig,
    ) -> Result<StepInvocation, PipelineError> {
        let step_config = |source| PipelineError::StepConfig {
            step: step.id.to_string(),
            source,
        };

        let parameters = step.build_parameters(config).map_err(step_config)?;
        let location = step
            .source
            .locate(config, &self.project_root)
            .map_err(step_config)?;
        let outputs = step.declared_outputs(&parameters);

        Ok(StepInvocation {
            step: step.id.to_string(),
            location: location.uri,
            entrypoint: step.entrypoint.to_string(),
            version: location.version,
            parameters,
            outputs,
        })
    }

    /// Describes the step, then writes its scratch inputs and adds their
    /// paths to the parameters.
    fn prepare(
        &self,
        step: &StepDescriptor,
        config: &PipelineConfig,
        workspace: &mut ScratchWorkspace,
    ) -> Result<StepInvocation, PipelineError> {
        let mut invocation = self.describe(step, config)?;

        for input in step.scratch_inputs {
            let document = config
                .resolve_json(input.config_path)
                .map_err(|source| PipelineError::StepConfig {
                    step: step.id.to_string(),
                    source,
                })?;
            let path = workspace.write_json(input.file_name, &document)?;
            invocation
                .parameters
                .insert(input.parameter, ParamValue::Path(path));
        }

        Ok(invocation)
    }

    fn log_abort(&self, err: &PipelineError, plan: &ExecutionPlan) {
        error!("Pipeline aborted: {}", err);
        let skipped = plan.pending();
        if !skipped.is_empty() {
            warn!("Steps not attempted: {}", skipped.join(", "));
        }
    }
}
