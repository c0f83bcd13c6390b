//! State store trait definition.
//!
//! Defines the persistence interface for workflow definitions, run state,
//! and named checkpoints. The infrastructure layer (conductor-infra)
//! implements this trait with SQLite and JSON-file persistence; an in-memory
//! implementation lives in [`super::memory`].

use std::future::Future;

use conductor_types::error::StorageError;
use conductor_types::workflow::{Checkpoint, RunState, ValueMap, WorkflowDefinition, WorkflowId};

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Definitions:** the immutable step graph, saved once at creation.
/// - **Run state:** whole-record overwrite on every save.
/// - **Checkpoints:** named snapshots, upserted by `(workflow_id, name)`.
///
/// Implementations never retry internally; the engine decides how a failed
/// write is surfaced.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait StateStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Run state
    // -----------------------------------------------------------------------

    /// Save (insert or replace) the run state for its workflow.
    fn save_workflow_state(
        &self,
        state: &RunState,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Load the run state for a workflow, if stored.
    fn load_workflow_state(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Option<RunState>, StorageError>> + Send;

    /// Delete everything stored for a workflow: definition, state, and
    /// checkpoints. Returns `true` if anything existed.
    fn delete_workflow_state(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// List every stored run state, oldest workflow first.
    fn list_workflow_states(&self) -> impl Future<Output = Result<Vec<RunState>, StorageError>> + Send;

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    fn save_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Option<WorkflowDefinition>, StorageError>> + Send;

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Store a named checkpoint. A later write with the same name replaces
    /// the earlier one.
    fn create_checkpoint(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// List checkpoints for a workflow ordered by `created_at`, then name.
    fn list_checkpoints(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Vec<Checkpoint>, StorageError>> + Send;

    /// Return the payload of a named checkpoint, or `None` if absent.
    fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> impl Future<Output = Result<Option<ValueMap>, StorageError>> + Send;

    /// Delete a named checkpoint. Returns `true` if it existed.
    fn delete_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;
}

/// Sort checkpoints the way every store reports them.
pub fn sort_checkpoints(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Shared stores: lets several engines (or an engine and a test) use one store.
impl<T: StateStore> StateStore for std::sync::Arc<T> {
    fn save_workflow_state(
        &self,
        state: &RunState,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).save_workflow_state(state)
    }

    fn load_workflow_state(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Option<RunState>, StorageError>> + Send {
        (**self).load_workflow_state(id)
    }

    fn delete_workflow_state(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send {
        (**self).delete_workflow_state(id)
    }

    fn list_workflow_states(&self) -> impl Future<Output = Result<Vec<RunState>, StorageError>> + Send {
        (**self).list_workflow_states()
    }

    fn save_definition(
        &self,
        definition: &WorkflowDefinition,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).save_definition(definition)
    }

    fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Option<WorkflowDefinition>, StorageError>> + Send {
        (**self).load_definition(id)
    }

    fn create_checkpoint(
        &self,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).create_checkpoint(checkpoint)
    }

    fn list_checkpoints(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Vec<Checkpoint>, StorageError>> + Send {
        (**self).list_checkpoints(id)
    }

    fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> impl Future<Output = Result<Option<ValueMap>, StorageError>> + Send {
        (**self).restore_from_checkpoint(id, name)
    }

    fn delete_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send {
        (**self).delete_checkpoint(id, name)
    }
}
