//! CLI command definitions for mlforge.
//!
//! `run` executes the selected pipeline steps through `mlflow run`, `plan`
//! shows what would be executed, and `steps` lists the registry.

use crate::config::{Override, PipelineConfig};
use crate::pipeline::{registry, Orchestrator, PipelineReport, PlannedStep, StepSource};
use crate::runner::MlflowRunner;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "config.yaml";

/// Orchestrator for multi-step ML pipelines.
#[derive(Parser)]
#[command(name = "mlforge")]
#[command(about = "Run multi-step ML pipelines as mlflow components")]
#[command(version)]
#[command(
    long_about = "mlforge selects pipeline steps from a YAML configuration, resolves their parameters and runs each step as an mlflow component.\n\nExample usage:\n  mlforge run -c config.yaml main.steps=download,basic_cleaning\n  mlforge run modeling.random_forest.n_estimators=200 ++modeling.random_forest.max_depth=15"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the selected pipeline steps.
    Run(RunArgs),

    /// Show the steps that would run, with locations and parameters.
    Plan(PlanArgs),

    /// List the registered steps in execution order.
    Steps(StepsArgs),
}

/// Configuration source shared by `run` and `plan`.
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Pipeline configuration file (YAML).
    #[arg(short = 'c', long, env = "MLFORGE_CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Directory local components are resolved against (default: current directory).
    #[arg(long)]
    pub project_root: Option<PathBuf>,

    /// Configuration overrides: key=value, +key=value (add) or ++key=value (upsert).
    #[arg(value_name = "OVERRIDES")]
    pub overrides: Vec<String>,
}

/// Arguments for `mlforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: ConfigArgs,

    /// Parent directory for the run's scratch workspace (default: system temp dir).
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// mlflow executable used to launch steps.
    #[arg(long, env = "MLFLOW_BIN", default_value = crate::runner::mlflow::DEFAULT_PROGRAM)]
    pub mlflow_bin: String,

    /// Environment manager passed to `mlflow run` (e.g. conda, virtualenv, local).
    #[arg(long)]
    pub env_manager: Option<String>,

    /// Output JSON report.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mlforge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: ConfigArgs,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mlforge steps`.
#[derive(Parser, Debug)]
pub struct StepsArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// Use this when you need access to CLI args before running (e.g., for log level).
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the mlforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Plan(args) => run_plan_command(args),
        Commands::Steps(args) => run_steps_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.source)?;
    let project_root = resolve_project_root(args.source.project_root.as_deref())?;

    let mut runner = MlflowRunner::new()
        .with_program(args.mlflow_bin)
        .with_working_dir(&project_root);
    if let Some(env_manager) = args.env_manager {
        runner = runner.with_env_manager(env_manager);
    }
    let runner = Arc::new(runner);

    let mut orchestrator = Orchestrator::new(runner.clone(), runner).with_project_root(project_root);
    if let Some(dir) = args.scratch_dir {
        orchestrator = orchestrator.with_scratch_dir(dir);
    }

    let report = orchestrator
        .run(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Pipeline failed: {}", e))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!("\n=== Pipeline Run {} ===", report.run_id);
    println!("State:    {}", report.state);
    println!(
        "Duration: {:.1}s",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    if report.steps.is_empty() {
        println!("No steps selected.");
        return;
    }
    println!();
    for record in &report.steps {
        println!("  {:<24} {}", record.step, record.state);
        for artifact in &record.produced {
            println!("    produced: {artifact}");
        }
    }
}

// ============================================================================
// Plan Command Implementation
// ============================================================================

fn run_plan_command(args: PlanArgs) -> anyhow::Result<()> {
    let config = load_config(&args.source)?;
    let project_root = resolve_project_root(args.source.project_root.as_deref())?;

    let runner = Arc::new(MlflowRunner::new());
    let planned = Orchestrator::new(runner.clone(), runner)
        .with_project_root(project_root)
        .plan(&config)
        .map_err(|e| anyhow::anyhow!("Failed to plan pipeline: {}", e))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
    } else {
        print_plan(&planned);
    }
    Ok(())
}

fn print_plan(planned: &[PlannedStep]) {
    if planned.is_empty() {
        println!("No steps selected.");
        return;
    }
    for (index, step) in planned.iter().enumerate() {
        let invocation = &step.invocation;
        println!("{}. {}", index + 1, invocation.step);
        match &invocation.version {
            Some(version) => println!("   source: {} @ {}", invocation.location, version),
            None => println!("   source: {}", invocation.location),
        }
        for assignment in invocation.parameters.to_assignments() {
            println!("   -P {assignment}");
        }
        for parameter in &step.scratch_inputs {
            println!("   -P {parameter}=<scratch file>");
        }
    }
}

// ============================================================================
// Steps Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct StepListing {
    position: usize,
    id: &'static str,
    source: String,
    entrypoint: &'static str,
}

fn step_listings() -> Vec<StepListing> {
    registry()
        .iter()
        .map(|step| StepListing {
            position: step.position,
            id: step.id,
            source: describe_source(&step.source),
            entrypoint: step.entrypoint,
        })
        .collect()
}

fn describe_source(source: &StepSource) -> String {
    match source {
        StepSource::Repository { component, version } => {
            format!("components repository: {component}@{version}")
        }
        StepSource::Local { path } => format!("local: {path}"),
    }
}

fn run_steps_command(args: StepsArgs) -> anyhow::Result<()> {
    let listings = step_listings();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    } else {
        for listing in &listings {
            println!("{:>2}. {:<24} {}", listing.position + 1, listing.id, listing.source);
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_overrides(raw: &[String]) -> anyhow::Result<Vec<Override>> {
    raw.iter()
        .map(|s| s.parse::<Override>().map_err(|e| anyhow::anyhow!("{}", e)))
        .collect()
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<PipelineConfig> {
    let overrides = parse_overrides(&args.overrides)?;
    info!("Loading configuration from {}", args.config.display());
    let config = PipelineConfig::load(&args.config, &overrides)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    debug!("Applied {} override(s)", overrides.len());
    Ok(config)
}

fn resolve_project_root(root: Option<&Path>) -> anyhow::Result<PathBuf> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    root.canonicalize().map_err(|e| {
        anyhow::anyhow!("Project root does not exist: {} ({})", root.display(), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_with_overrides() {
        let args = vec![
            "mlforge",
            "run",
            "-c",
            "pipelines/airbnb.yaml",
            "--env-manager",
            "local",
            "-j",
            "main.steps=download,basic_cleaning",
            "++modeling.random_forest.max_depth=15",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.source.config, PathBuf::from("pipelines/airbnb.yaml"));
                assert_eq!(args.env_manager.as_deref(), Some("local"));
                assert_eq!(args.mlflow_bin, "mlflow");
                assert!(args.json);
                assert_eq!(
                    args.source.overrides,
                    vec![
                        "main.steps=download,basic_cleaning",
                        "++modeling.random_forest.max_depth=15"
                    ]
                );
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["mlforge", "steps", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Steps(_)));
    }

    #[test]
    fn test_parse_overrides_rejects_malformed() {
        assert!(parse_overrides(&["main.steps".to_string()]).is_err());
        let parsed = parse_overrides(&["+etl.extra=1".to_string()]).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_step_listings_follow_registry() {
        let listings = step_listings();
        assert_eq!(listings.len(), registry().len());
        assert_eq!(listings[0].id, "download");
        assert_eq!(listings[0].source, "components repository: get_data@main");
        assert_eq!(listings[1].source, "local: src/basic_cleaning");
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "main:\n  steps: all\n").unwrap();

        let args = ConfigArgs {
            config: path,
            project_root: None,
            overrides: vec!["main.steps=download".to_string()],
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.resolve_str("main.steps").unwrap(), "download");

        let args = ConfigArgs {
            overrides: vec!["main.missing=1".to_string()],
            ..args
        };
        assert!(load_config(&args).is_err());
    }
}
