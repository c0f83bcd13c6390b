//! In-memory `StateStore` backed by `DashMap`.
//!
//! Used by tests and by `--ephemeral` CLI runs. Nothing survives the process.

use std::collections::BTreeMap;

use conductor_types::error::StorageError;
use conductor_types::workflow::{Checkpoint, RunState, ValueMap, WorkflowDefinition, WorkflowId};
use dashmap::DashMap;

use super::state::{StateStore, sort_checkpoints};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    definitions: DashMap<WorkflowId, WorkflowDefinition>,
    states: DashMap<WorkflowId, RunState>,
    checkpoints: DashMap<WorkflowId, BTreeMap<String, Checkpoint>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    async fn save_workflow_state(&self, state: &RunState) -> Result<(), StorageError> {
        self.states.insert(state.workflow_id, state.clone());
        Ok(())
    }

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<RunState>, StorageError> {
        Ok(self.states.get(id).map(|s| s.clone()))
    }

    async fn delete_workflow_state(&self, id: &WorkflowId) -> Result<bool, StorageError> {
        let state = self.states.remove(id).is_some();
        let definition = self.definitions.remove(id).is_some();
        let checkpoints = self.checkpoints.remove(id).is_some();
        Ok(state || definition || checkpoints)
    }

    async fn list_workflow_states(&self) -> Result<Vec<RunState>, StorageError> {
        let mut states: Vec<RunState> = self.states.iter().map(|e| e.value().clone()).collect();
        // UUID v7 ids sort by creation time.
        states.sort_by_key(|s| s.workflow_id);
        Ok(states)
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StorageError> {
        self.definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    async fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, StorageError> {
        Ok(self.definitions.get(id).map(|d| d.clone()))
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        self.checkpoints
            .entry(checkpoint.workflow_id)
            .or_default()
            .insert(checkpoint.name.clone(), checkpoint.clone());
        Ok(())
    }

    async fn list_checkpoints(&self, id: &WorkflowId) -> Result<Vec<Checkpoint>, StorageError> {
        let mut list: Vec<Checkpoint> = self
            .checkpoints
            .get(id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        sort_checkpoints(&mut list);
        Ok(list)
    }

    async fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> Result<Option<ValueMap>, StorageError> {
        Ok(self
            .checkpoints
            .get(id)
            .and_then(|m| m.get(name).map(|c| c.payload.clone())))
    }

    async fn delete_checkpoint(&self, id: &WorkflowId, name: &str) -> Result<bool, StorageError> {
        Ok(self
            .checkpoints
            .get_mut(id)
            .map(|mut m| m.remove(name).is_some())
            .unwrap_or(false))
    }
}
