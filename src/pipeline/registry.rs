//! Static registry of known pipeline steps.
//!
//! Registry order is execution order. Steps that consume an artifact must
//! come after the step producing it; nothing checks this at runtime, so keep
//! the table in data-dependency order when adding steps.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::artifact::ArtifactReference;
use crate::config::PipelineConfig;
use crate::error::ConfigError;

use super::params::{ParamValue, ParameterMap};

/// Entry point every component exposes.
pub const DEFAULT_ENTRYPOINT: &str = "main";

/// Signature of a step's parameter mapping function.
pub type ParameterFn = fn(&PipelineConfig) -> Result<ParameterMap, ConfigError>;

/// Where a step's implementation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSource {
    /// A component of the shared repository named by `main.components_repository`.
    Repository {
        component: &'static str,
        version: &'static str,
    },
    /// A component directory relative to the project root.
    Local { path: &'static str },
}

/// Resolved location handed to the step runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepLocation {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl StepSource {
    /// Resolves the source against the configuration and project root.
    ///
    /// # Errors
    ///
    /// Repository sources fail with `MissingConfigKey` when
    /// `main.components_repository` is absent.
    pub fn locate(
        &self,
        config: &PipelineConfig,
        project_root: &Path,
    ) -> Result<StepLocation, ConfigError> {
        match self {
            StepSource::Repository { component, version } => {
                let repository = config.resolve_str("main.components_repository")?;
                Ok(StepLocation {
                    uri: format!("{}/{}", repository.trim_end_matches('/'), component),
                    version: Some(version.to_string()),
                })
            }
            StepSource::Local { path } => Ok(StepLocation {
                uri: project_root.join(path).display().to_string(),
                version: None,
            }),
        }
    }
}

/// A parameter whose value is a file written from a configuration sub-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchInput {
    /// Parameter that receives the file path.
    pub parameter: &'static str,
    /// Configuration sub-tree serialized into the file.
    pub config_path: &'static str,
    /// File name inside the scratch workspace.
    pub file_name: &'static str,
}

/// Immutable description of one registered step.
pub struct StepDescriptor {
    pub id: &'static str,
    /// Index in execution order.
    pub position: usize,
    pub source: StepSource,
    pub entrypoint: &'static str,
    /// Pure mapping from configuration to parameters. Never touches the filesystem.
    pub parameters: ParameterFn,
    pub scratch_inputs: &'static [ScratchInput],
    /// Parameters naming artifacts this step produces.
    pub outputs: &'static [&'static str],
}

impl StepDescriptor {
    /// Builds the step's parameter map (without scratch inputs).
    pub fn build_parameters(&self, config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
        (self.parameters)(config)
    }

    /// Artifacts this step declares it produces, taken from its parameters.
    pub fn declared_outputs(&self, parameters: &ParameterMap) -> Vec<ArtifactReference> {
        self.outputs
            .iter()
            .filter_map(|name| parameters.get(name))
            .filter_map(ParamValue::as_artifact)
            .collect()
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("source", &self.source)
            .field("entrypoint", &self.entrypoint)
            .field("scratch_inputs", &self.scratch_inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

static STEPS: [StepDescriptor; 6] = [
    StepDescriptor {
        id: "download",
        position: 0,
        source: StepSource::Repository {
            component: "get_data",
            version: "main",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: download_parameters,
        scratch_inputs: &[],
        outputs: &["artifact_name"],
    },
    StepDescriptor {
        id: "basic_cleaning",
        position: 1,
        source: StepSource::Local {
            path: "src/basic_cleaning",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: basic_cleaning_parameters,
        scratch_inputs: &[],
        outputs: &["output_artifact"],
    },
    StepDescriptor {
        id: "data_check",
        position: 2,
        source: StepSource::Local {
            path: "src/data_check",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: data_check_parameters,
        scratch_inputs: &[],
        outputs: &[],
    },
    StepDescriptor {
        id: "data_split",
        position: 3,
        source: StepSource::Local {
            path: "components/train_val_test_split",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: data_split_parameters,
        scratch_inputs: &[],
        outputs: &[],
    },
    StepDescriptor {
        id: "train_random_forest",
        position: 4,
        source: StepSource::Local {
            path: "src/train_random_forest",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: train_random_forest_parameters,
        scratch_inputs: &[ScratchInput {
            parameter: "rf_config",
            config_path: "modeling.random_forest",
            file_name: "rf_config.json",
        }],
        outputs: &["output_artifact"],
    },
    StepDescriptor {
        id: "test_regression_model",
        position: 5,
        source: StepSource::Local {
            path: "components/test_regression_model",
        },
        entrypoint: DEFAULT_ENTRYPOINT,
        parameters: test_regression_model_parameters,
        scratch_inputs: &[],
        outputs: &[],
    },
];

/// All registered steps in execution order.
pub fn registry() -> &'static [StepDescriptor] {
    &STEPS
}

/// Registered step identifiers in execution order.
pub fn step_ids() -> Vec<&'static str> {
    STEPS.iter().map(|step| step.id).collect()
}

/// Looks up a step by identifier.
pub fn find(id: &str) -> Option<&'static StepDescriptor> {
    STEPS.iter().find(|step| step.id == id)
}

/// Resolves `path` if present, otherwise uses the step's default.
fn scalar_or(config: &PipelineConfig, path: &str, default: &str) -> Result<ParamValue, ConfigError> {
    if config.contains(path) {
        config.resolve_scalar(path)
    } else {
        Ok(ParamValue::from(default))
    }
}

fn artifact_or(
    config: &PipelineConfig,
    path: &str,
    default: ArtifactReference,
) -> Result<ArtifactReference, ConfigError> {
    if config.contains(path) {
        config.resolve_artifact(path)
    } else {
        Ok(default)
    }
}

fn download_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with("sample", config.resolve_scalar("etl.sample")?)
        .with(
            "artifact_name",
            scalar_or(config, "parameters.download.artifact_name", "sample.csv")?,
        )
        .with(
            "artifact_type",
            scalar_or(config, "parameters.download.artifact_type", "raw_data")?,
        )
        .with(
            "artifact_description",
            scalar_or(
                config,
                "parameters.download.artifact_description",
                "Raw file as downloaded",
            )?,
        ))
}

fn basic_cleaning_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with(
            "input_artifact",
            config.resolve_artifact("parameters.basic_cleaning.input_artifact")?,
        )
        .with(
            "output_artifact",
            config.resolve_scalar("parameters.basic_cleaning.output_artifact")?,
        )
        .with(
            "artifact_type",
            config.resolve_scalar("parameters.basic_cleaning.artifact_type")?,
        )
        .with(
            "artifact_description",
            config.resolve_scalar("parameters.basic_cleaning.artifact_description")?,
        )
        .with("min_price", config.resolve_scalar("etl.min_price")?)
        .with("max_price", config.resolve_scalar("etl.max_price")?))
}

fn data_check_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with("csv", config.resolve_artifact("parameters.data_check.csv")?)
        .with("ref", config.resolve_artifact("parameters.data_check.ref")?)
        .with("kl_threshold", config.resolve_scalar("data_check.kl_threshold")?)
        .with("min_price", config.resolve_scalar("etl.min_price")?)
        .with("max_price", config.resolve_scalar("etl.max_price")?))
}

fn data_split_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with("input", config.resolve_artifact("parameters.data_split.input")?)
        .with("test_size", config.resolve_scalar("modeling.test_size")?)
        .with("random_seed", config.resolve_scalar("modeling.random_seed")?)
        .with("stratify_by", config.resolve_scalar("modeling.stratify_by")?))
}

fn train_random_forest_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with(
            "trainval_artifact",
            artifact_or(
                config,
                "parameters.train_random_forest.trainval_artifact",
                ArtifactReference::versioned("trainval_data.csv", "latest"),
            )?,
        )
        .with("val_size", config.resolve_scalar("modeling.val_size")?)
        .with("random_seed", config.resolve_scalar("modeling.random_seed")?)
        .with("stratify_by", config.resolve_scalar("modeling.stratify_by")?)
        .with(
            "max_tfidf_features",
            config.resolve_scalar("modeling.max_tfidf_features")?,
        )
        .with(
            "output_artifact",
            scalar_or(
                config,
                "parameters.train_random_forest.output_artifact",
                "random_forest_export",
            )?,
        ))
}

fn test_regression_model_parameters(config: &PipelineConfig) -> Result<ParameterMap, ConfigError> {
    Ok(ParameterMap::new()
        .with(
            "mlflow_model",
            config.resolve_artifact("parameters.test_regression_model.mlflow_model")?,
        )
        .with(
            "test_dataset",
            config.resolve_artifact("parameters.test_regression_model.test_dataset")?,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Override;
    use std::path::PathBuf;

    const CONFIG: &str = r#"
main:
  project_name: nyc_airbnb
  experiment_name: development
  components_repository: "https://github.com/example/ml-components#components/"
etl:
  sample: sample1.csv
  min_price: 10
  max_price: 350
data_check:
  kl_threshold: 0.2
parameters:
  basic_cleaning:
    input_artifact: "sample.csv:latest"
    output_artifact: clean_sample.csv
    artifact_type: clean_sample
    artifact_description: Data with outliers and null values removed
  data_check:
    csv: "clean_sample.csv:latest"
    ref: "clean_sample.csv:reference"
  data_split:
    input: "clean_sample.csv:latest"
  test_regression_model:
    mlflow_model: "random_forest_export:prod"
    test_dataset: "test_data.csv:latest"
modeling:
  test_size: 0.2
  val_size: 0.2
  random_seed: 42
  stratify_by: neighbourhood_group
  max_tfidf_features: 5
  random_forest:
    n_estimators: 100
    max_depth: 15
"#;

    fn config() -> PipelineConfig {
        PipelineConfig::from_yaml_str(CONFIG).unwrap()
    }

    #[test]
    fn test_registry_order_and_positions() {
        assert_eq!(
            step_ids(),
            vec![
                "download",
                "basic_cleaning",
                "data_check",
                "data_split",
                "train_random_forest",
                "test_regression_model",
            ]
        );
        for (index, step) in registry().iter().enumerate() {
            assert_eq!(step.position, index, "position mismatch for {}", step.id);
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("data_split").map(|s| s.position), Some(3));
        assert!(find("bogus_step").is_none());
    }

    #[test]
    fn test_download_uses_defaults() {
        let params = find("download").unwrap().build_parameters(&config()).unwrap();
        assert_eq!(params.get("sample"), Some(&ParamValue::from("sample1.csv")));
        assert_eq!(params.get("artifact_name"), Some(&ParamValue::from("sample.csv")));
        assert_eq!(params.get("artifact_type"), Some(&ParamValue::from("raw_data")));
        assert_eq!(
            params.get("artifact_description"),
            Some(&ParamValue::from("Raw file as downloaded"))
        );
    }

    #[test]
    fn test_download_defaults_can_be_overridden() {
        let overrides: Vec<Override> = vec!["+parameters.download.artifact_name=sample2.csv"
            .parse()
            .unwrap()];
        let config = config().with_overrides(&overrides).unwrap();
        let params = find("download").unwrap().build_parameters(&config).unwrap();
        assert_eq!(params.get("artifact_name"), Some(&ParamValue::from("sample2.csv")));
    }

    #[test]
    fn test_basic_cleaning_parameters() {
        let params = find("basic_cleaning").unwrap().build_parameters(&config()).unwrap();
        assert_eq!(params.len(), 6);
        assert_eq!(
            params.get("input_artifact"),
            Some(&ParamValue::Artifact(ArtifactReference::versioned("sample.csv", "latest")))
        );
        assert_eq!(params.get("min_price"), Some(&ParamValue::Integer(10)));
        assert_eq!(params.get("max_price"), Some(&ParamValue::Integer(350)));
    }

    #[test]
    fn test_data_check_and_split_parameters() {
        let params = find("data_check").unwrap().build_parameters(&config()).unwrap();
        assert_eq!(
            params.names().collect::<Vec<_>>(),
            vec!["csv", "kl_threshold", "max_price", "min_price", "ref"]
        );
        assert_eq!(params.get("kl_threshold"), Some(&ParamValue::Float(0.2)));

        let params = find("data_split").unwrap().build_parameters(&config()).unwrap();
        assert_eq!(params.get("random_seed"), Some(&ParamValue::Integer(42)));
        assert_eq!(
            params.get("stratify_by"),
            Some(&ParamValue::from("neighbourhood_group"))
        );
    }

    #[test]
    fn test_train_random_forest_parameters_are_pure() {
        let step = find("train_random_forest").unwrap();
        let params = step.build_parameters(&config()).unwrap();
        assert!(!params.contains("rf_config"));
        assert_eq!(
            params.get("trainval_artifact"),
            Some(&ParamValue::Artifact(ArtifactReference::versioned(
                "trainval_data.csv",
                "latest"
            )))
        );
        assert_eq!(params.get("max_tfidf_features"), Some(&ParamValue::Integer(5)));
        assert_eq!(step.scratch_inputs.len(), 1);
        assert_eq!(step.scratch_inputs[0].parameter, "rf_config");
        assert_eq!(
            step.declared_outputs(&params),
            vec![ArtifactReference::latest("random_forest_export")]
        );
    }

    #[test]
    fn test_test_regression_model_has_exactly_two_parameters() {
        let params = find("test_regression_model")
            .unwrap()
            .build_parameters(&config())
            .unwrap();
        assert_eq!(
            params.names().collect::<Vec<_>>(),
            vec!["mlflow_model", "test_dataset"]
        );
        assert_eq!(
            params.get("mlflow_model").unwrap().to_string(),
            "random_forest_export:prod"
        );
        assert_eq!(
            params.get("test_dataset").unwrap().to_string(),
            "test_data.csv:latest"
        );
    }

    #[test]
    fn test_missing_key_fails_only_that_step() {
        let config = PipelineConfig::from_yaml_str("etl:\n  sample: sample1.csv\n").unwrap();
        assert!(find("download").unwrap().build_parameters(&config).is_ok());

        let err = find("basic_cleaning")
            .unwrap()
            .build_parameters(&config)
            .unwrap_err();
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_locate_sources() {
        let config = config();
        let root = PathBuf::from("/srv/project");

        let location = find("download")
            .unwrap()
            .source
            .locate(&config, &root)
            .unwrap();
        assert_eq!(
            location.uri,
            "https://github.com/example/ml-components#components/get_data"
        );
        assert_eq!(location.version.as_deref(), Some("main"));

        let location = find("data_split")
            .unwrap()
            .source
            .locate(&config, &root)
            .unwrap();
        assert_eq!(location.uri, "/srv/project/components/train_val_test_split");
        assert_eq!(location.version, None);
    }

    #[test]
    fn test_locate_repository_requires_key() {
        let config = PipelineConfig::from_yaml_str("main:\n  steps: all\n").unwrap();
        let err = find("download")
            .unwrap()
            .source
            .locate(&config, Path::new("."))
            .unwrap_err();
        assert!(err.is_missing_key());
    }
}
