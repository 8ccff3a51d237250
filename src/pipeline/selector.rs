//! Step activation: turns a selection expression into the ordered active set.

use serde_yaml::Value;

use crate::config::{value_kind, PipelineConfig};
use crate::error::{ConfigError, SelectionError};

use super::registry::StepDescriptor;

/// Selection sentinel meaning every registered step.
pub const ALL_STEPS: &str = "all";

/// Configuration key holding the selection expression.
pub const STEPS_KEY: &str = "main.steps";

/// Reads the selection expression from `main.steps`.
///
/// An absent (or null) key means `"all"`. A YAML sequence of identifiers is
/// accepted and joined with commas.
pub fn selection_expression(config: &PipelineConfig) -> Result<String, ConfigError> {
    match config.get(STEPS_KEY) {
        None | Some(Value::Null) => Ok(ALL_STEPS.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.as_str()),
                other => Err(ConfigError::TypeMismatch {
                    path: STEPS_KEY.to_string(),
                    expected: "sequence of step identifiers",
                    found: value_kind(other),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|ids| ids.join(",")),
        Some(other) => Err(ConfigError::TypeMismatch {
            path: STEPS_KEY.to_string(),
            expected: "string",
            found: value_kind(other),
        }),
    }
}

/// Selects the steps named by `expression`, in registry order.
///
/// - `"all"`, matched exactly, selects every registered step.
/// - Otherwise the expression is split on commas and each token trimmed;
///   empty tokens are ignored. The result follows registry order, not token
///   order.
/// - An empty expression selects nothing.
///
/// # Errors
///
/// Returns `SelectionError::UnknownStepIdentifier` for the first token that
/// names no registered step.
pub fn select_steps<'a>(
    expression: &str,
    registry: &'a [StepDescriptor],
) -> Result<Vec<&'a StepDescriptor>, SelectionError> {
    if expression == ALL_STEPS {
        return Ok(registry.iter().collect());
    }

    let tokens: Vec<&str> = expression
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();

    if let Some(unknown) = tokens
        .iter()
        .find(|token| !registry.iter().any(|step| step.id == **token))
    {
        return Err(SelectionError::UnknownStepIdentifier {
            token: unknown.to_string(),
            known: registry
                .iter()
                .map(|step| step.id)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    Ok(registry
        .iter()
        .filter(|step| tokens.contains(&step.id))
        .collect())
}
