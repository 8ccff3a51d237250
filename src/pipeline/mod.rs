//! Pipeline orchestration for multi-step ML workflows.
//!
//! # Architecture
//!
//! - **Registry**: the fixed, ordered list of known steps and their parameter mappings
//! - **Selector**: turns `main.steps` into the active step set
//! - **Workspace**: run-scoped scratch directory for generated step inputs
//! - **State**: per-step and pipeline state machine
//! - **Orchestrator**: drives one run through a [`StepRunner`](crate::runner::StepRunner)
//!
//! # Pipeline Flow
//!
//! 1. **Selection**: `main.steps` is resolved against the registry
//! 2. **Grouping**: the tracker receives the project/group identity
//! 3. **Preparation**: per step, parameters are mapped and scratch inputs written
//! 4. **Execution**: the runner executes the step; a failure aborts the run
//! 5. **Teardown**: the scratch workspace is removed
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mlforge::config::PipelineConfig;
//! use mlforge::pipeline::Orchestrator;
//! use mlforge::runner::MlflowRunner;
//!
//! let config = PipelineConfig::load("config.yaml", &[])?;
//! let runner = Arc::new(MlflowRunner::new().with_env_manager("conda"));
//! let orchestrator = Orchestrator::new(runner.clone(), runner);
//!
//! let report = orchestrator.run(&config).await?;
//! println!("Run {} finished: {}", report.run_id, report.state);
//! ```

pub mod orchestrator;
pub mod params;
pub mod registry;
pub mod selector;
pub mod state;
pub mod workspace;

pub use orchestrator::{Orchestrator, PipelineError, PipelineReport, PlannedStep};
pub use params::{ParamValue, ParameterMap};
pub use registry::{registry, step_ids, ScratchInput, StepDescriptor, StepLocation, StepSource};
pub use selector::{select_steps, selection_expression, ALL_STEPS};
pub use state::{ExecutionPlan, PipelineState, StepRecord, StepState, TransitionError};
pub use workspace::ScratchWorkspace;
