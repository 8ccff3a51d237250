//! mlforge: orchestrator for multi-step ML pipelines.
//!
//! This library selects pipeline steps from a YAML configuration, resolves
//! each step's parameters, and executes the steps in order through an
//! external runner, passing artifacts between them by reference.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod tracking;

// Re-export commonly used types
pub use artifact::ArtifactReference;
pub use config::PipelineConfig;
pub use error::{ArtifactError, ConfigError, SelectionError, StepError, WorkspaceError};
pub use pipeline::{Orchestrator, PipelineError, PipelineReport};
