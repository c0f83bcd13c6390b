//! Workflow service: the lifecycle API used by the CLI and HTTP layers.
//!
//! Composes the `WorkflowEngine` with the `TemplateCatalog` so callers can
//! go from a template key straight to a registered, runnable workflow.

use std::path::Path;
use std::sync::Arc;

use conductor_types::template::{TemplateInstantiation, TemplateSummary};
use conductor_types::workflow::{
    DependencyMap, StepSpec, ValueMap, WorkflowId, WorkflowStatistics, WorkflowStatus,
};

use crate::repository::state::StateStore;
use crate::workflow::definition::{WorkflowError, load_workflow_file};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::templates::TemplateCatalog;

/// Service orchestrating workflow creation, execution, and reporting.
///
/// Generic over the state store -- conductor-core never depends on
/// conductor-infra.
pub struct WorkflowService<S: StateStore> {
    engine: Arc<WorkflowEngine<S>>,
    catalog: TemplateCatalog,
}

impl<S: StateStore> WorkflowService<S> {
    pub fn new(engine: Arc<WorkflowEngine<S>>, catalog: TemplateCatalog) -> Self {
        Self { engine, catalog }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine<S>> {
        &self.engine
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        steps: Vec<StepSpec>,
        dependencies: DependencyMap,
    ) -> Result<WorkflowId, WorkflowError> {
        self.engine
            .create_workflow(name, description, steps, dependencies)
            .await
    }

    /// Register a workflow from a YAML or JSON definition file.
    pub async fn create_workflow_from_file(&self, path: &Path) -> Result<WorkflowId, WorkflowError> {
        let definition = load_workflow_file(path)?.into_definition()?;
        self.engine.register_definition(definition).await
    }

    pub async fn execute_workflow(&self, id: WorkflowId) -> Result<bool, WorkflowError> {
        self.engine.execute_workflow(id).await
    }

    pub fn get_workflow_status(&self, id: WorkflowId) -> Option<WorkflowStatus> {
        self.engine.get_workflow_status(id)
    }

    pub fn list_templates(&self, category: Option<&str>) -> Vec<TemplateSummary> {
        self.catalog
            .list_templates(category)
            .into_iter()
            .map(TemplateSummary::from)
            .collect()
    }

    pub fn get_categories(&self) -> Vec<String> {
        self.catalog
            .get_categories()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Instantiate a template and register the resulting workflow.
    pub async fn create_workflow_from_template(
        &self,
        template_key: &str,
        custom_inputs: &ValueMap,
    ) -> Result<TemplateInstantiation, WorkflowError> {
        let definition = self.catalog.instantiate(template_key, custom_inputs)?;
        let id = self.engine.register_definition(definition).await?;
        tracing::info!(workflow_id = %id, template = template_key, "workflow created from template");
        Ok(TemplateInstantiation::new(id, template_key))
    }

    pub fn get_workflow_statistics(&self) -> WorkflowStatistics {
        WorkflowStatistics {
            templates: self.catalog.len(),
            ..self.engine.get_statistics()
        }
    }
}
