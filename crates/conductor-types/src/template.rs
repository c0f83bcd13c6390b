//! Workflow template types.
//!
//! A `Template` is a reusable recipe of `StepSpec`s whose inputs may carry
//! `{{ placeholder }}` markers filled in from caller-supplied values when
//! the template is instantiated.

use serde::{Deserialize, Serialize};

use crate::workflow::{DependencyMap, StepSpec, WorkflowId};

/// A named, categorized workflow recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Lookup key (e.g. `code_quality_audit`).
    pub key: String,
    /// Human-readable name (e.g. "Code Quality Audit").
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub dependencies: DependencyMap,
    /// Placeholder names the template expects callers to supply.
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Listing row for a template, without its step bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub key: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub step_count: usize,
    pub parameters: Vec<String>,
}

impl From<&Template> for TemplateSummary {
    fn from(t: &Template) -> Self {
        Self {
            key: t.key.clone(),
            name: t.name.clone(),
            description: t.description.clone(),
            category: t.category.clone(),
            step_count: t.steps.len(),
            parameters: t.parameters.clone(),
        }
    }
}

/// Result of creating a workflow from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInstantiation {
    pub workflow_id: WorkflowId,
    pub template_key: String,
    pub message: String,
}

impl TemplateInstantiation {
    pub fn new(workflow_id: WorkflowId, template_key: impl Into<String>) -> Self {
        Self {
            workflow_id,
            template_key: template_key.into(),
            message: format!("Workflow created with ID: {workflow_id}"),
        }
    }
}
