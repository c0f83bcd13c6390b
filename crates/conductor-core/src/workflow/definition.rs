//! Workflow definition building, validation, and file loading.
//!
//! Turns caller-supplied step specs into the canonical `WorkflowDefinition`:
//! assigns missing step ids, checks structural constraints (non-empty name,
//! unique ids, known dependencies, acyclic graph), and parses YAML/JSON
//! definition files.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use conductor_types::error::StorageError;
use conductor_types::workflow::{
    DependencyMap, StepDefinition, StepId, StepSpec, WorkflowDefinition, WorkflowId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dag::validate_dag;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural problems with a workflow definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A dependency entry names a step that does not exist.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(StepId),

    #[error("workflow name must not be empty")]
    EmptyName,
}

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The definition was rejected before any state was created.
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("workflow {0} is already running")]
    AlreadyRunning(WorkflowId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("template not found: '{0}'")]
    TemplateNotFound(String),

    #[error("invalid checkpoint name: '{0}'")]
    InvalidCheckpointName(String),

    /// YAML/JSON parse failure or unreadable definition file.
    #[error("parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Definition files
// ---------------------------------------------------------------------------

/// On-disk shape of a workflow definition file (YAML or JSON).
///
/// ```yaml
/// name: Scan and report
/// steps:
///   - id: scan
///     name: Scan project
///     node_type: scan_project
///     inputs: { project_path: "." }
///   - id: report
///     name: Report
///     node_type: log_message
///     inputs: { message: "{{ steps.scan.file_count }} files" }
/// dependencies:
///   report: [scan]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub dependencies: DependencyMap,
}

/// Parse a YAML string into a `WorkflowSpec`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowSpec, WorkflowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Parse a JSON string into a `WorkflowSpec`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowSpec, WorkflowError> {
    serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load a workflow spec from disk. `.json` files are parsed as JSON,
/// everything else as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowSpec, WorkflowError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WorkflowError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_workflow_json(&content),
        _ => parse_workflow_yaml(&content),
    }
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Assign ids to step specs.
///
/// Explicit ids are kept (duplicates rejected). A missing id becomes
/// `step_<position>`, or a random `step_<suffix>` if that is already taken.
pub fn assign_step_ids(steps: Vec<StepSpec>) -> Result<Vec<StepDefinition>, DefinitionError> {
    let mut taken: HashSet<StepId> = HashSet::new();
    for id in steps.iter().filter_map(|s| s.id.as_ref()) {
        if !taken.insert(id.clone()) {
            return Err(DefinitionError::DuplicateStepId(id.clone()));
        }
    }

    let mut out = Vec::with_capacity(steps.len());
    for (index, spec) in steps.into_iter().enumerate() {
        let id = match spec.id {
            Some(id) => id,
            None => {
                let mut candidate = StepId::positional(index);
                while taken.contains(&candidate) {
                    candidate = StepId::generated();
                }
                taken.insert(candidate.clone());
                candidate
            }
        };
        out.push(StepDefinition {
            id,
            name: spec.name,
            description: spec.description,
            node_type: spec.node_type,
            inputs: spec.inputs,
            timeout_secs: spec.timeout_secs,
            max_attempts: spec.max_attempts.unwrap_or(1).max(1),
        });
    }
    Ok(out)
}

/// Build and validate a new definition with a fresh `WorkflowId`.
pub fn build_definition(
    name: &str,
    description: &str,
    steps: Vec<StepSpec>,
    dependencies: DependencyMap,
) -> Result<WorkflowDefinition, DefinitionError> {
    let def = WorkflowDefinition {
        id: WorkflowId::new(),
        name: name.trim().to_string(),
        description: description.to_string(),
        steps: assign_step_ids(steps)?,
        dependencies,
        created_at: Utc::now(),
    };
    validate_definition(&def)?;
    Ok(def)
}

impl WorkflowSpec {
    /// Build a validated definition from this spec.
    pub fn into_definition(self) -> Result<WorkflowDefinition, DefinitionError> {
        build_definition(&self.name, &self.description, self.steps, self.dependencies)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - Name is non-empty
/// - All step IDs are unique
/// - Every dependency key and value names an existing step
/// - The dependency graph is acyclic
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    if def.name.trim().is_empty() {
        return Err(DefinitionError::EmptyName);
    }

    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(DefinitionError::DuplicateStepId(step.id.clone()));
        }
    }

    validate_dag(def)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::workflow::ValueMap;
    use std::collections::BTreeSet;

    fn spec(name: &str) -> StepSpec {
        StepSpec::new(name, "log_message", ValueMap::new())
    }

    #[test]
    fn test_assigns_positional_ids() {
        let steps = assign_step_ids(vec![spec("A"), spec("B").with_id("custom"), spec("C")]).unwrap();
        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step_1", "custom", "step_3"]);
        assert!(steps.iter().all(|s| s.max_attempts == 1));
    }

    #[test]
    fn test_positional_collision_gets_fresh_id() {
        let steps = assign_step_ids(vec![spec("A"), spec("B").with_id("step_1")]).unwrap();
        assert_ne!(steps[0].id.as_str(), "step_1");
        assert!(steps[0].id.as_str().starts_with("step_"));
        assert_eq!(steps[1].id.as_str(), "step_1");
    }

    #[test]
    fn test_duplicate_explicit_ids_rejected() {
        let err = assign_step_ids(vec![spec("A").with_id("x"), spec("B").with_id("x")]).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateStepId(StepId::from("x")));
    }

    #[test]
    fn test_build_definition_rejects_empty_name() {
        let err = build_definition("  ", "", vec![spec("A")], DependencyMap::new()).unwrap_err();
        assert_eq!(err, DefinitionError::EmptyName);
    }

    #[test]
    fn test_build_definition_rejects_cycle() {
        let mut deps = DependencyMap::new();
        deps.insert(StepId::from("a"), BTreeSet::from([StepId::from("b")]));
        deps.insert(StepId::from("b"), BTreeSet::from([StepId::from("a")]));
        let err = build_definition(
            "loop",
            "",
            vec![spec("A").with_id("a"), spec("B").with_id("b")],
            deps,
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::CycleDetected(_)));
    }

    #[test]
    fn test_build_definition_with_positional_dependencies() {
        let mut deps = DependencyMap::new();
        deps.insert(StepId::from("step_2"), BTreeSet::from([StepId::from("step_1")]));
        let def = build_definition("chain", "two steps", vec![spec("A"), spec("B")], deps).unwrap();
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.dependencies_of(&StepId::from("step_2")).count(), 1);
    }

    #[test]
    fn test_parse_yaml_spec() {
        let yaml = r#"
name: scan-and-report
steps:
  - id: scan
    name: Scan
    node_type: scan_project
    inputs:
      project_path: "."
  - name: Report
    node_type: log_message
    max_attempts: 3
dependencies:
  step_2: [scan]
"#;
        let spec = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(spec.steps.len(), 2);
        let def = spec.into_definition().unwrap();
        assert_eq!(def.steps[1].id.as_str(), "step_2");
        assert_eq!(def.steps[1].max_attempts, 3);
        assert_eq!(def.steps[0].inputs["project_path"], ".");
    }

    #[test]
    fn test_parse_json_spec_and_error() {
        let json = r#"{"name":"j","steps":[{"name":"A","node_type":"sleep","inputs":{"duration":0.1}}]}"#;
        let spec = parse_workflow_json(json).unwrap();
        assert_eq!(spec.steps[0].node_type, "sleep");

        let err = parse_workflow_json("{not json").unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)));
    }

    #[test]
    fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(
            &path,
            r#"{"name":"file","steps":[{"name":"A","node_type":"log_message"}]}"#,
        )
        .unwrap();
        let spec = load_workflow_file(&path).unwrap();
        assert_eq!(spec.name, "file");

        let missing = load_workflow_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read"));
    }

    #[test]
    fn test_workflow_error_wraps_definition_error() {
        let err: WorkflowError = DefinitionError::CycleDetected("x".into()).into();
        assert!(matches!(
            err,
            WorkflowError::InvalidDefinition(DefinitionError::CycleDetected(_))
        ));
        assert!(err.to_string().contains("cycle detected"));
    }
}
