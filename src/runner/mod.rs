//! Step runners: execute one pipeline component given its parameters.
//!
//! # Architecture
//!
//! ```text
//! StepDescriptor + PipelineConfig → StepInvocation → StepRunner → StepOutcome
//! ```
//!
//! The orchestrator only describes the call. A runner launches the component
//! (for [`MlflowRunner`], an `mlflow run` process), waits for it, and reports
//! pass/fail plus the artifacts it registered. Runners never see the
//! configuration itself.

pub mod mlflow;

use async_trait::async_trait;
use serde::Serialize;

use crate::artifact::ArtifactReference;
use crate::error::StepError;
use crate::pipeline::params::ParameterMap;

pub use mlflow::MlflowRunner;

/// Everything a runner needs to execute one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInvocation {
    /// Step identifier from the registry.
    pub step: String,
    /// Component location (local directory or repository URI).
    pub location: String,
    pub entrypoint: String,
    /// Component version to check out, for repository components.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub parameters: ParameterMap,
    /// Artifacts the step is declared to produce.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<ArtifactReference>,
}

/// Result of a successful step execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Artifacts registered with the artifact store by the step.
    pub produced: Vec<ArtifactReference>,
}

impl StepOutcome {
    pub fn new(produced: Vec<ArtifactReference>) -> Self {
        Self { produced }
    }
}

/// Executes a single step.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs the step to completion. Returns an error if the step failed.
    async fn execute(&self, invocation: &StepInvocation) -> Result<StepOutcome, StepError>;
}
