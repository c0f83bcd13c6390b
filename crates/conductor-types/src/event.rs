//! Event types for the Conductor workflow event bus.
//!
//! `WorkflowEvent` is broadcast by the engine during workflow lifecycle.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::workflow::{StepId, WorkflowId, WorkflowRunStatus};

/// Events emitted while creating and executing workflows.
///
/// Subscribers (CLI progress output, HTTP clients, tests) receive these via
/// the event bus. Delivery is best-effort: slow subscribers may lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A definition passed validation and its pending state was stored.
    WorkflowCreated {
        workflow_id: WorkflowId,
        name: String,
        step_count: usize,
    },

    /// The scheduler started (or resumed) a run.
    RunStarted {
        workflow_id: WorkflowId,
        /// Steps left to execute in this run.
        pending_steps: usize,
    },

    StepStarted {
        workflow_id: WorkflowId,
        step_id: StepId,
        node_type: String,
        attempt: u32,
    },

    StepCompleted {
        workflow_id: WorkflowId,
        step_id: StepId,
        duration_ms: u64,
    },

    StepFailed {
        workflow_id: WorkflowId,
        step_id: StepId,
        error: String,
        will_retry: bool,
    },

    /// A step was marked failed without running because a dependency failed.
    StepSkipped {
        workflow_id: WorkflowId,
        step_id: StepId,
        reason: String,
    },

    /// A write-through save failed; execution continues.
    StatePersistFailed {
        workflow_id: WorkflowId,
        error: String,
    },

    RunFinished {
        workflow_id: WorkflowId,
        status: WorkflowRunStatus,
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    /// The workflow this event belongs to.
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            Self::WorkflowCreated { workflow_id, .. }
            | Self::RunStarted { workflow_id, .. }
            | Self::StepStarted { workflow_id, .. }
            | Self::StepCompleted { workflow_id, .. }
            | Self::StepFailed { workflow_id, .. }
            | Self::StepSkipped { workflow_id, .. }
            | Self::StatePersistFailed { workflow_id, .. }
            | Self::RunFinished { workflow_id, .. } => *workflow_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WorkflowEvent::StepFailed {
            workflow_id: WorkflowId::new(),
            step_id: StepId::from("scan"),
            error: "boom".to_string(),
            will_retry: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_failed");
        assert_eq!(json["step_id"], "scan");
        assert_eq!(json["will_retry"], false);
    }

    #[test]
    fn test_workflow_id_accessor() {
        let id = WorkflowId::new();
        let event = WorkflowEvent::RunFinished {
            workflow_id: id,
            status: WorkflowRunStatus::Completed,
            duration_ms: 12,
        };
        assert_eq!(event.workflow_id(), id);

        let json = serde_json::to_string(&event).unwrap();
        let back: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
