use routine_actions::{ActionRegistry, BuildContext, Step, StepBuilder, StepMetadata, TemplateRegistry};
use serde_json::Value;

use crate::error::LoaderError;
use crate::file::{ConfigParam, RoutineFile, SentryRecord};

/// A routine file fully lowered into executable Steps, ready to hand to a
/// bot. Holds its own copy of the declarative metadata (`config`,
/// `sentries`, `tags`) the registry and sentry manager consult without
/// re-parsing the source file.
#[derive(Clone)]
pub struct CompiledRoutine {
    /// The routine's display name.
    pub name: String,
    /// Human-readable summary.
    pub description: Option<String>,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Declared user-tunable variables.
    pub config: Vec<ConfigParam>,
    /// The compiled root step list.
    pub steps: Vec<Step>,
    /// Whether a failing Step is swallowed after its issue is reported,
    /// rather than aborting the routine.
    pub ignore_errors: bool,
    /// Background health-check registrations declared alongside this
    /// routine.
    pub sentries: Vec<SentryRecord>,
}

/// A step record may carry `action`/`type` (the loader accepts either key,
/// normalizing to `type` before registry dispatch) and an optional nested
/// `metadata` object (`timeoutMs`/`maxAttempts`/`retryDelayMs`) applied to
/// the step(s) it builds — kept as a separate object rather than top-level
/// fields so it never collides with an action's own same-named fields
/// (`While.maxAttempts`, for instance).
fn normalize_step(raw: &Value) -> Value {
    let mut value = raw.clone();
    if let Some(object) = value.as_object_mut() {
        if !object.contains_key("type") {
            if let Some(action) = object.get("action").cloned() {
                object.insert("type".to_string(), action);
            }
        }
    }
    value
}

fn step_metadata(raw: &Value) -> Option<StepMetadata> {
    let metadata = raw.get("metadata")?;
    Some(StepMetadata {
        timeout_ms: metadata.get("timeoutMs").and_then(Value::as_u64),
        max_attempts: metadata
            .get("maxAttempts")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(1),
        retry_delay_ms: metadata.get("retryDelayMs").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Lowers a parsed [`RoutineFile`] into a [`CompiledRoutine`], validating
/// and building every root-level action in order. Errors from action `N`
/// are path-prefixed `"action N: ..."`, matching the nested-action
/// convention composite actions use for their own children.
pub fn compile_routine_file(
    file: &RoutineFile,
    actions: &ActionRegistry,
    templates: &TemplateRegistry,
) -> Result<CompiledRoutine, LoaderError> {
    let mut builder = StepBuilder::new(templates);
    builder.set_ignore_errors(file.ignore_errors);
    let build_context = BuildContext::new(templates);

    for (index, raw) in file.steps.iter().enumerate() {
        let normalized = normalize_step(raw);
        let prefix = format!("action {index}");

        let action = actions
            .build(&normalized)
            .map_err(|err| LoaderError::Action(err.with_path_prefix(&prefix)))?;
        action
            .validate(&build_context)
            .map_err(|err| LoaderError::Action(err.with_path_prefix(&prefix)))?;
        action
            .build(&mut builder)
            .map_err(|err| LoaderError::Action(err.with_path_prefix(&prefix)))?;

        if let Some(metadata) = step_metadata(&normalized) {
            builder.wrap_last_with_metadata(metadata);
        }
    }

    Ok(CompiledRoutine {
        name: file.routine_name.clone(),
        description: file.description.clone(),
        tags: file.tags.clone(),
        config: file.config.clone(),
        steps: builder.into_steps(),
        ignore_errors: file.ignore_errors,
        sentries: file.sentries.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::from_str;

    #[test]
    fn compiles_a_simple_routine() {
        let yaml = r#"
routine_name: "Farm Packs"
tags: ["farming"]
steps:
  - action: While
    condition: { type: VariableEquals, variable: "keep_going", value: "yes" }
    maxAttempts: 3
    actions:
      - action: Click
        x: 10
        y: 20
      - action: Sleep
        duration: 5
"#;
        let file: RoutineFile = from_str(yaml).unwrap();
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let compiled = compile_routine_file(&file, &actions, &templates).unwrap();
        assert_eq!(compiled.name, "Farm Packs");
        assert_eq!(compiled.tags, vec!["farming".to_string()]);
        assert_eq!(compiled.steps.len(), 1);
    }

    #[test]
    fn unknown_action_type_fails_with_path_prefix() {
        let yaml = r#"
routine_name: "Broken"
steps:
  - action: Bogus
"#;
        let file: RoutineFile = from_str(yaml).unwrap();
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let err = compile_routine_file(&file, &actions, &templates).unwrap_err();
        assert!(err.to_string().starts_with("action 0:"));
    }

    #[test]
    fn step_metadata_wraps_the_built_step() {
        let yaml = r#"
routine_name: "Retrying"
steps:
  - action: Click
    x: 1
    y: 1
    metadata: { maxAttempts: 3, retryDelayMs: 10 }
"#;
        let file: RoutineFile = from_str(yaml).unwrap();
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let compiled = compile_routine_file(&file, &actions, &templates).unwrap();
        assert_eq!(compiled.steps.len(), 1);
    }
}
