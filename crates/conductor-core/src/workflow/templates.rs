//! Built-in workflow template catalog.
//!
//! Templates are step recipes with `{{ parameter }}` placeholders in their
//! inputs. Instantiating one substitutes caller-supplied values and builds a
//! validated `WorkflowDefinition`. Placeholders the caller did not supply are
//! left as written, so `{{ steps.<id>.<field> }}` references survive for the
//! engine to resolve at run time.

use std::collections::{BTreeMap, BTreeSet};

use conductor_types::template::Template;
use conductor_types::workflow::{DependencyMap, StepId, StepSpec, ValueMap, WorkflowDefinition};
use serde_json::{Value, json};

use super::definition::{WorkflowError, build_definition};
use super::nodes::{AI_CHAT, CONDITIONAL, LOG_MESSAGE, SCAN_PROJECT};
use super::placeholder::substitute_map;

/// Key-indexed set of templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl TemplateCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the six built-in templates.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for template in [
            code_quality_audit(),
            test_generation(),
            documentation_generation(),
            feature_implementation(),
            bug_fix(),
            project_initialization(),
        ] {
            catalog.register(template);
        }
        catalog
    }

    /// Add or replace a template by key.
    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.key.clone(), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates sorted by key, optionally restricted to one category.
    pub fn list_templates(&self, category: Option<&str>) -> Vec<&Template> {
        self.templates
            .values()
            .filter(|t| category.is_none_or(|c| t.category == c))
            .collect()
    }

    pub fn get_template(&self, key: &str) -> Option<&Template> {
        self.templates.get(key)
    }

    pub fn get_categories(&self) -> BTreeSet<&str> {
        self.templates.values().map(|t| t.category.as_str()).collect()
    }

    /// Build a definition from a template and caller-supplied values.
    pub fn instantiate(
        &self,
        key: &str,
        custom_inputs: &ValueMap,
    ) -> Result<WorkflowDefinition, WorkflowError> {
        let template = self
            .get_template(key)
            .ok_or_else(|| WorkflowError::TemplateNotFound(key.to_string()))?;

        let lookup = |name: &str| custom_inputs.get(name).cloned();
        let steps: Vec<StepSpec> = template
            .steps
            .iter()
            .map(|spec| StepSpec {
                inputs: substitute_map(&spec.inputs, &lookup),
                ..spec.clone()
            })
            .collect();

        Ok(build_definition(
            &template.name,
            &template.description,
            steps,
            template.dependencies.clone(),
        )?)
    }
}

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

fn step(id: &str, name: &str, node_type: &str, inputs: Value) -> StepSpec {
    let inputs = match inputs {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    };
    StepSpec::new(name, node_type, inputs).with_id(id)
}

/// Dependencies from `(step, [deps])` pairs.
fn deps(edges: &[(&str, &[&str])]) -> DependencyMap {
    edges
        .iter()
        .map(|(id, on)| {
            (
                StepId::from(*id),
                on.iter().map(|d| StepId::from(*d)).collect::<BTreeSet<_>>(),
            )
        })
        .collect()
}

fn params(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn code_quality_audit() -> Template {
    Template {
        key: "code_quality_audit".to_string(),
        name: "Code Quality Audit".to_string(),
        description: "Scan a project and review its code quality".to_string(),
        category: "code_quality".to_string(),
        steps: vec![
            step(
                "scan",
                "Scan project",
                SCAN_PROJECT,
                json!({ "project_path": "{{ project_path }}" }),
            ),
            step(
                "review",
                "Review code quality",
                AI_CHAT,
                json!({
                    "system_message": "You are a senior engineer performing a code quality audit.",
                    "prompt": "Audit the code quality of the project at {{ project_path }}. \
                               It contains {{ steps.scan.file_count }} files: {{ steps.scan.files }}. \
                               Report maintainability issues, code smells, and concrete fixes."
                }),
            ),
            step(
                "report",
                "Report audit",
                LOG_MESSAGE,
                json!({ "message": "Code quality audit finished for {{ project_path }}", "level": "info" }),
            ),
        ],
        dependencies: deps(&[("review", &["scan"]), ("report", &["review"])]),
        parameters: params(&["project_path"]),
    }
}

fn test_generation() -> Template {
    Template {
        key: "test_generation".to_string(),
        name: "Test Generation".to_string(),
        description: "Generate unit tests for a project".to_string(),
        category: "testing".to_string(),
        steps: vec![
            step(
                "scan",
                "Scan project",
                SCAN_PROJECT,
                json!({ "project_path": "{{ project_path }}" }),
            ),
            step(
                "generate",
                "Generate tests",
                AI_CHAT,
                json!({
                    "system_message": "You write thorough, idiomatic unit tests.",
                    "prompt": "Write {{ test_framework }} tests for the project at {{ project_path }}. \
                               Files: {{ steps.scan.files }}. Cover edge cases and error paths."
                }),
            ),
            step(
                "report",
                "Report tests",
                LOG_MESSAGE,
                json!({ "message": "Test generation finished for {{ project_path }}" }),
            ),
        ],
        dependencies: deps(&[("generate", &["scan"]), ("report", &["generate"])]),
        parameters: params(&["project_path", "test_framework"]),
    }
}

fn documentation_generation() -> Template {
    Template {
        key: "documentation_generation".to_string(),
        name: "Documentation Generation".to_string(),
        description: "Generate API docs and a README for a project".to_string(),
        category: "documentation".to_string(),
        steps: vec![
            step(
                "scan",
                "Scan project",
                SCAN_PROJECT,
                json!({ "project_path": "{{ project_path }}" }),
            ),
            step(
                "api_docs",
                "Write API documentation",
                AI_CHAT,
                json!({
                    "prompt": "Write API documentation for the project at {{ project_path }}. \
                               Files: {{ steps.scan.files }}."
                }),
            ),
            step(
                "readme",
                "Write README",
                AI_CHAT,
                json!({
                    "prompt": "Write a README for the project at {{ project_path }} \
                               ({{ steps.scan.file_count }} files)."
                }),
            ),
            step(
                "report",
                "Report documentation",
                LOG_MESSAGE,
                json!({ "message": "Documentation generated for {{ project_path }}" }),
            ),
        ],
        dependencies: deps(&[
            ("api_docs", &["scan"]),
            ("readme", &["scan"]),
            ("report", &["api_docs", "readme"]),
        ]),
        parameters: params(&["project_path"]),
    }
}

fn feature_implementation() -> Template {
    Template {
        key: "feature_implementation".to_string(),
        name: "Feature Implementation".to_string(),
        description: "Plan and implement a feature from requirements".to_string(),
        category: "development".to_string(),
        steps: vec![
            step(
                "analyze",
                "Analyze requirements",
                AI_CHAT,
                json!({
                    "prompt": "Analyze the requirements for the feature '{{ feature_name }}': {{ requirements }}. \
                               List open questions and acceptance criteria."
                }),
            ),
            step(
                "scan",
                "Scan project",
                SCAN_PROJECT,
                json!({ "project_path": "{{ project_path }}" }),
            ),
            step(
                "design",
                "Design implementation",
                AI_CHAT,
                json!({
                    "prompt": "Design an implementation of '{{ feature_name }}' for the project at \
                               {{ project_path }}. Analysis: {{ steps.analyze.ai_response }}"
                }),
            ),
            step(
                "implement",
                "Implement feature",
                AI_CHAT,
                json!({
                    "prompt": "Implement '{{ feature_name }}' following this design: {{ steps.design.ai_response }}"
                }),
            ),
            step(
                "report",
                "Report feature",
                LOG_MESSAGE,
                json!({ "message": "Feature '{{ feature_name }}' implemented" }),
            ),
        ],
        dependencies: deps(&[
            ("design", &["analyze", "scan"]),
            ("implement", &["design"]),
            ("report", &["implement"]),
        ]),
        parameters: params(&["feature_name", "requirements", "project_path"]),
    }
}

fn bug_fix() -> Template {
    Template {
        key: "bug_fix".to_string(),
        name: "Bug Fix".to_string(),
        description: "Diagnose a bug and propose a fix".to_string(),
        category: "debugging".to_string(),
        steps: vec![
            step(
                "scan",
                "Scan project",
                SCAN_PROJECT,
                json!({ "project_path": "{{ project_path }}" }),
            ),
            step(
                "diagnose",
                "Diagnose bug",
                AI_CHAT,
                json!({
                    "system_message": "You are an expert debugger.",
                    "prompt": "Diagnose this bug: {{ bug_description }}. Project files: {{ steps.scan.files }}"
                }),
            ),
            step(
                "fix",
                "Propose fix",
                AI_CHAT,
                json!({
                    "prompt": "Propose a minimal fix for: {{ bug_description }}. Diagnosis: {{ steps.diagnose.ai_response }}"
                }),
            ),
            step(
                "report",
                "Report fix",
                LOG_MESSAGE,
                json!({ "message": "Bug fix proposed" }),
            ),
        ],
        dependencies: deps(&[
            ("diagnose", &["scan"]),
            ("fix", &["diagnose"]),
            ("report", &["fix"]),
        ]),
        parameters: params(&["bug_description", "project_path"]),
    }
}

fn project_initialization() -> Template {
    Template {
        key: "project_initialization".to_string(),
        name: "Project Initialization".to_string(),
        description: "Plan the layout of a new project".to_string(),
        category: "project_setup".to_string(),
        steps: vec![
            step(
                "license",
                "Choose license",
                CONDITIONAL,
                json!({
                    "condition": "{{ license_type }}",
                    "true_value": "{{ license_type }}",
                    "false_value": "MIT"
                }),
            ),
            step(
                "structure",
                "Plan structure",
                AI_CHAT,
                json!({
                    "prompt": "Propose a directory structure and build setup for a new {{ project_type }} \
                               project named '{{ project_name }}' licensed under {{ steps.license.result }}."
                }),
            ),
            step(
                "report",
                "Report project",
                LOG_MESSAGE,
                json!({ "message": "Project '{{ project_name }}' initialized" }),
            ),
        ],
        dependencies: deps(&[("structure", &["license"]), ("report", &["structure"])]),
        parameters: params(&["project_name", "project_type", "license_type"]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
