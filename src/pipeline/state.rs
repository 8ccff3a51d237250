//! Execution state of a pipeline run.
//!
//! Every selected step starts `Pending`. The driver moves a step to
//! `Running` right before invoking the runner, then to `Succeeded` or
//! `Failed`. A failure (or a step that cannot even be described) aborts the
//! pipeline; steps after it stay `Pending`.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::artifact::ArtifactReference;

/// State of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepState {
    /// Valid transitions: Pending -> Running, Running -> Succeeded | Failed.
    pub fn can_transition(self, to: StepState) -> bool {
        matches!(
            (self, to),
            (StepState::Pending, StepState::Running)
                | (StepState::Running, StepState::Succeeded)
                | (StepState::Running, StepState::Failed)
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Running => write!(f, "running"),
            StepState::Succeeded => write!(f, "succeeded"),
            StepState::Failed => write!(f, "failed"),
        }
    }
}

/// State of the pipeline as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Completed => write!(f, "completed"),
            PipelineState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Errors raised by illegal state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid state transition for step '{step}' from '{from}' to '{to}'")]
    InvalidTransition {
        step: String,
        from: StepState,
        to: StepState,
    },

    #[error("No step at position {0} in this run")]
    UnknownStep(usize),

    #[error("Pipeline is {0} and can no longer change state")]
    Finished(PipelineState),

    #[error("Cannot complete pipeline: step '{step}' is {state}")]
    Incomplete { step: String, state: StepState },
}

/// Record of one step's progress through a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub produced: Vec<ArtifactReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl StepRecord {
    fn pending(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            state: StepState::Pending,
            produced: Vec::new(),
            duration_ms: None,
            error: None,
            started: None,
        }
    }

    fn elapsed(&self) -> Option<u64> {
        self.started
            .map(|started| duration_millis(started.elapsed()))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Ordered step records plus the overall pipeline state.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    steps: Vec<StepRecord>,
    state: PipelineState,
}

impl ExecutionPlan {
    /// Creates a plan with every step `Pending` and the pipeline `Running`.
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: steps.into_iter().map(StepRecord::pending).collect(),
            state: PipelineState::Running,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepRecord> {
        self.steps.get(index)
    }

    /// Identifiers of steps never attempted.
    pub fn pending(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|record| record.state == StepState::Pending)
            .map(|record| record.step.as_str())
            .collect()
    }

    /// Marks a step `Running`.
    pub fn start(&mut self, index: usize) -> Result<(), TransitionError> {
        let record = self.transition(index, StepState::Running)?;
        record.started = Some(Instant::now());
        Ok(())
    }

    /// Marks a running step `Succeeded` and records what it produced.
    pub fn succeed(
        &mut self,
        index: usize,
        produced: Vec<ArtifactReference>,
    ) -> Result<(), TransitionError> {
        let record = self.transition(index, StepState::Succeeded)?;
        record.duration_ms = record.elapsed();
        record.produced = produced;
        Ok(())
    }

    /// Marks a running step `Failed` and aborts the pipeline.
    pub fn fail(&mut self, index: usize, error: impl Into<String>) -> Result<(), TransitionError> {
        let record = self.transition(index, StepState::Failed)?;
        record.duration_ms = record.elapsed();
        record.error = Some(error.into());
        self.state = PipelineState::Aborted;
        Ok(())
    }

    /// Aborts the pipeline because a step could not be prepared.
    ///
    /// The step never ran, so it stays `Pending` with the error attached.
    pub fn abort_at(&mut self, index: usize, error: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_running()?;
        let record = self
            .steps
            .get_mut(index)
            .ok_or(TransitionError::UnknownStep(index))?;
        record.error = Some(error.into());
        self.state = PipelineState::Aborted;
        Ok(())
    }

    /// Aborts the pipeline without attributing the failure to a step.
    pub fn abort(&mut self) {
        if self.state == PipelineState::Running {
            self.state = PipelineState::Aborted;
        }
    }

    /// Marks the pipeline `Completed`; every step must have succeeded.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.ensure_running()?;
        if let Some(record) = self
            .steps
            .iter()
            .find(|record| record.state != StepState::Succeeded)
        {
            return Err(TransitionError::Incomplete {
                step: record.step.clone(),
                state: record.state,
            });
        }
        self.state = PipelineState::Completed;
        Ok(())
    }

    /// Consumes the plan, returning its step records.
    pub fn into_records(self) -> Vec<StepRecord> {
        self.steps
    }

    fn ensure_running(&self) -> Result<(), TransitionError> {
        match self.state {
            PipelineState::Running => Ok(()),
            finished => Err(TransitionError::Finished(finished)),
        }
    }

    fn transition(
        &mut self,
        index: usize,
        to: StepState,
    ) -> Result<&mut StepRecord, TransitionError> {
        self.ensure_running()?;
        let record = self
            .steps
            .get_mut(index)
            .ok_or(TransitionError::UnknownStep(index))?;
        if !record.state.can_transition(to) {
            return Err(TransitionError::InvalidTransition {
                step: record.step.clone(),
                from: record.state,
                to,
            });
        }
        record.state = to;
        Ok(record)
    }
}
