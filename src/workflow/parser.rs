//! Workflow Parser
//!
//! Loads and saves workflow definitions (and input contexts) as YAML or JSON.
//! The format is picked from the file extension; anything that is not
//! `.json` is treated as YAML.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, WorkflowError};

use super::model::{Context, WorkflowDefinition};

/// On-disk formats for definitions and contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

fn parse<T: DeserializeOwned>(content: &str, format: DocumentFormat) -> Result<T> {
    match format {
        DocumentFormat::Json => Ok(serde_json::from_str(content)?),
        DocumentFormat::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}

fn render<T: Serialize>(value: &T, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        DocumentFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        WorkflowError::Storage(format!(
            "Failed to read '{}': {}. Check that the file exists and is readable.",
            path.display(),
            e
        ))
    })
}

/// Parses a workflow definition from a string.
pub fn parse_definition(content: &str, format: DocumentFormat) -> Result<WorkflowDefinition> {
    let definition: WorkflowDefinition = parse(content, format)?;
    debug!(
        "Parsed workflow '{}' with {} steps",
        definition.name,
        definition.steps.len()
    );
    Ok(definition)
}

/// Loads a workflow definition from a YAML or JSON file.
///
/// The definition is not validated here; validation happens when it is
/// handed to the engine.
///
/// ```rust,no_run
/// use agentrunner::workflow::load_definition_file;
///
/// let definition = load_definition_file("pipeline.yaml").unwrap();
/// println!("Loaded {} steps", definition.steps.len());
/// ```
pub fn load_definition_file(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = read_document(path)?;
    debug!("Workflow file loaded ({} bytes)", content.len());

    parse_definition(&content, DocumentFormat::from_path(path))
}

/// Saves a workflow definition, choosing the format from the extension.
pub fn save_definition_file(definition: &WorkflowDefinition, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = render(definition, DocumentFormat::from_path(path))?;
    fs::write(path, content)?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}

/// Loads an input context (a mapping of names to values) from a file.
pub fn load_context_file(path: impl AsRef<Path>) -> Result<Context> {
    let path = path.as_ref();
    let content = read_document(path)?;
    let context: Context = parse(&content, DocumentFormat::from_path(path))?;
    debug!("Loaded {} input values from {}", context.len(), path.display());
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{ExecutionMode, WorkflowStep};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(DocumentFormat::from_path(Path::new("a.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("a.JSON")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("a.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a.yml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("noext")), DocumentFormat::Yaml);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
name: Greeting
execution_mode: Conditional
steps:
  - id: hello
    name: Say hello
    agent_id: echo
    order: 1
    input_mapping:
      who: user
    execution_condition: "exists:user"
  - id: bye
    name: Say bye
    agent_id: echo
    order: 2
    dependencies: [hello]
"#;
        let definition = parse_definition(yaml, DocumentFormat::Yaml).unwrap();

        assert_eq!(definition.name, "Greeting");
        assert_eq!(definition.execution_mode, ExecutionMode::Conditional);
        assert_eq!(definition.steps.len(), 2);
        assert_eq!(definition.steps[0].input_mapping["who"], "user");
        assert_eq!(definition.steps[0].condition(), Some("exists:user"));
        assert_eq!(definition.steps[1].dependencies, vec!["hello"]);
    }

    #[test]
    fn test_save_and_load_json() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.json");

        let definition = WorkflowDefinition::new("wf-1", "Saved")
            .with_mode(ExecutionMode::Parallel)
            .with_step(WorkflowStep::new("a", "echo").with_config("value", 3));

        save_definition_file(&definition, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.trim_start().starts_with('{'));

        let loaded = load_definition_file(&path).unwrap();
        assert_eq!(loaded.id, "wf-1");
        assert_eq!(loaded.execution_mode, ExecutionMode::Parallel);
        assert_eq!(loaded.steps[0].configuration["value"], json!(3));
    }

    #[test]
    fn test_save_yaml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("wf.yaml");

        let definition =
            WorkflowDefinition::new("wf-2", "Yaml").with_step(WorkflowStep::new("a", "echo"));
        save_definition_file(&definition, &path).unwrap();

        let loaded = load_definition_file(&path).unwrap();
        assert_eq!(loaded.name, "Yaml");
    }

    #[test]
    fn test_load_file_not_found() {
        let result = load_definition_file("/nonexistent/path/workflow.yaml");
        assert!(matches!(result, Err(WorkflowError::Storage(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        std::fs::write(&path, "this is not valid yaml: [[[").unwrap();

        assert!(matches!(load_definition_file(&path), Err(WorkflowError::Yaml(_))));
    }

    #[test]
    fn test_load_context_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("input.json");
        std::fs::write(&path, r#"{"user": "ada", "count": 2}"#).unwrap();

        let context = load_context_file(&path).unwrap();
        assert_eq!(context["user"], json!("ada"));
        assert_eq!(context["count"], json!(2));
    }
}
