//! Workflow domain types for Conductor.
//!
//! Defines the immutable `WorkflowDefinition` (steps plus dependency edges),
//! the mutable `RunState` the engine layers on top of it, named checkpoints,
//! and the status/statistics records reported to callers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// JSON object used for step inputs, outputs, context and checkpoint payloads.
pub type ValueMap = Map<String, Value>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a workflow run, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new WorkflowId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a WorkflowId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of a step, unique within one workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Positional id used when a caller omits one (`step_1`, `step_2`, ...).
    pub fn positional(index: usize) -> Self {
        Self(format!("step_{}", index + 1))
    }

    /// Random id used when the positional id is already taken.
    pub fn generated() -> Self {
        let simple = Uuid::now_v7().simple().to_string();
        Self(format!("step_{}", &simple[simple.len() - 8..]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for StepId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Dependency edges: step id -> ids it must wait for.
pub type DependencyMap = BTreeMap<StepId, BTreeSet<StepId>>;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A step as supplied by callers (CLI, templates, definition files).
///
/// The id is optional; the engine assigns a positional one when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StepId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub node_type: String,
    #[serde(default)]
    pub inputs: ValueMap,
    /// Per-step timeout in seconds (engine default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Total attempts before the step is marked failed (default 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl StepSpec {
    /// Minimal step spec with no id and empty description.
    pub fn new(name: impl Into<String>, node_type: impl Into<String>, inputs: ValueMap) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            node_type: node_type.into(),
            inputs,
            timeout_secs: None,
            max_attempts: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<StepId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A single step in a validated workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: StepId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Key into the node registry.
    pub node_type: String,
    #[serde(default)]
    pub inputs: ValueMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    1
}

/// Immutable description of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered list of steps.
    pub steps: Vec<StepDefinition>,
    /// Dependency edges between step ids.
    #[serde(default)]
    pub dependencies: DependencyMap,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    /// Declared dependencies of a step (empty when none).
    pub fn dependencies_of(&self, id: &StepId) -> impl Iterator<Item = &StepId> {
        self.dependencies.get(id).into_iter().flatten()
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("invalid workflow status: '{other}'")),
        }
    }
}

/// Mutable execution-progress record for one workflow run.
///
/// Owned by the engine. Stores persist it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub workflow_id: WorkflowId,
    pub status: WorkflowRunStatus,
    /// Steps that finished successfully, in completion order.
    #[serde(default)]
    pub completed_steps: Vec<StepId>,
    #[serde(default)]
    pub failed_steps: BTreeSet<StepId>,
    /// Steps currently dispatched to a handler.
    #[serde(default)]
    pub running_steps: BTreeSet<StepId>,
    #[serde(default)]
    pub step_outputs: BTreeMap<StepId, ValueMap>,
    /// Failure reason per failed step, including cascaded failures.
    #[serde(default)]
    pub step_errors: BTreeMap<StepId, String>,
    /// Shared scratch space; each step's outputs land under its own id.
    #[serde(default)]
    pub context: ValueMap,
    /// Set when a write-through save failed; the stored copy may be stale.
    #[serde(default)]
    pub unpersisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh pending state for a newly created workflow.
    pub fn pending(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id,
            status: WorkflowRunStatus::Pending,
            completed_steps: Vec::new(),
            failed_steps: BTreeSet::new(),
            running_steps: BTreeSet::new(),
            step_outputs: BTreeMap::new(),
            step_errors: BTreeMap::new(),
            context: ValueMap::new(),
            unpersisted: false,
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self, step_id: &StepId) -> bool {
        self.completed_steps.contains(step_id)
    }

    /// Record a successful step. Outputs go to `step_outputs` and to
    /// `context[step_id]`.
    pub fn record_success(&mut self, step_id: &StepId, outputs: ValueMap) {
        self.running_steps.remove(step_id);
        if !self.is_completed(step_id) {
            self.completed_steps.push(step_id.clone());
        }
        self.context
            .insert(step_id.to_string(), Value::Object(outputs.clone()));
        self.step_outputs.insert(step_id.clone(), outputs);
        self.touch();
    }

    /// Record a failed step along with the reason.
    pub fn record_failure(&mut self, step_id: &StepId, reason: impl Into<String>) {
        self.running_steps.remove(step_id);
        self.failed_steps.insert(step_id.clone());
        self.step_errors.insert(step_id.clone(), reason.into());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// A named, independently restorable snapshot tied to a workflow id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub payload: ValueMap,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Cheap status summary of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub id: WorkflowId,
    pub name: String,
    pub status: WorkflowRunStatus,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub running_steps: usize,
    pub progress_percentage: f64,
    pub unpersisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStatus {
    /// Summarize a definition and its run state.
    pub fn from_parts(definition: &WorkflowDefinition, state: &RunState) -> Self {
        let total = definition.steps.len();
        let completed = state.completed_steps.len();
        let progress = if total == 0 {
            0.0
        } else {
            ((completed as f64 / total as f64) * 1000.0).round() / 10.0
        };
        Self {
            id: definition.id,
            name: definition.name.clone(),
            status: state.status,
            total_steps: total,
            completed_steps: completed,
            failed_steps: state.failed_steps.len(),
            running_steps: state.running_steps.len(),
            progress_percentage: progress,
            unpersisted: state.unpersisted,
            updated_at: state.updated_at,
        }
    }
}

/// Aggregate counts across all workflows known to an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub total_workflows: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub templates: usize,
}

impl WorkflowStatistics {
    /// Fold one workflow's status into the totals.
    pub fn record(&mut self, status: &WorkflowStatus) {
        self.total_workflows += 1;
        match status.status {
            WorkflowRunStatus::Pending => self.pending += 1,
            WorkflowRunStatus::Running => self.running += 1,
            WorkflowRunStatus::Completed => self.completed += 1,
            WorkflowRunStatus::Failed => self.failed += 1,
            WorkflowRunStatus::Cancelled => self.cancelled += 1,
        }
        self.total_steps += status.total_steps;
        self.completed_steps += status.completed_steps;
        self.failed_steps += status.failed_steps;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_definition() -> WorkflowDefinition {
        let mut deps = DependencyMap::new();
        deps.insert(StepId::from("log"), BTreeSet::from([StepId::from("scan")]));
        WorkflowDefinition {
            id: WorkflowId::new(),
            name: "Integration".to_string(),
            description: "scan then log".to_string(),
            steps: vec![
                StepDefinition {
                    id: StepId::from("scan"),
                    name: "Scan".to_string(),
                    description: String::new(),
                    node_type: "scan_project".to_string(),
                    inputs: json!({"project_path": "."}).as_object().cloned().unwrap(),
                    timeout_secs: None,
                    max_attempts: 1,
                },
                StepDefinition {
                    id: StepId::from("log"),
                    name: "Log".to_string(),
                    description: String::new(),
                    node_type: "log_message".to_string(),
                    inputs: ValueMap::new(),
                    timeout_secs: Some(5),
                    max_attempts: 2,
                },
            ],
            dependencies: deps,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn workflow_id_display_and_parse() {
        let id = WorkflowId::new();
        let parsed: WorkflowId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn step_id_serializes_as_plain_string() {
        let id = StepId::from("scan");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("scan"));
        assert_eq!(StepId::positional(0).as_str(), "step_1");
        assert!(StepId::generated().as_str().starts_with("step_"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(WorkflowRunStatus::Cancelled).unwrap();
        assert_eq!(v, json!("cancelled"));
        assert_eq!(
            "completed".parse::<WorkflowRunStatus>().unwrap(),
            WorkflowRunStatus::Completed
        );
        assert!("paused".parse::<WorkflowRunStatus>().is_err());
        assert!(WorkflowRunStatus::Failed.is_terminal());
        assert!(!WorkflowRunStatus::Running.is_terminal());
    }

    #[test]
    fn definition_round_trips_through_json() {
        let def = sample_definition();
        let json = serde_json::to_string(&def).unwrap();
        let back: WorkflowDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
        assert_eq!(back.dependencies_of(&StepId::from("log")).count(), 1);
        assert_eq!(back.dependencies_of(&StepId::from("scan")).count(), 0);
    }

    #[test]
    fn step_definition_defaults_max_attempts() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "a",
            "name": "A",
            "node_type": "sleep"
        }))
        .unwrap();
        assert_eq!(step.max_attempts, 1);
        assert!(step.inputs.is_empty());
    }

    #[test]
    fn record_success_merges_into_context() {
        let mut state = RunState::pending(WorkflowId::new());
        let id = StepId::from("scan");
        let outputs = json!({"file_count": 3}).as_object().cloned().unwrap();

        state.running_steps.insert(id.clone());
        state.record_success(&id, outputs.clone());
        state.record_success(&id, outputs.clone());

        assert_eq!(state.completed_steps, vec![id.clone()]);
        assert!(state.running_steps.is_empty());
        assert_eq!(state.step_outputs[&id], outputs);
        assert_eq!(state.context["scan"]["file_count"], 3);
    }

    #[test]
    fn record_failure_keeps_reason() {
        let mut state = RunState::pending(WorkflowId::new());
        let id = StepId::from("broken");
        state.record_failure(&id, "unknown node type 'nope'");
        assert!(state.failed_steps.contains(&id));
        assert_eq!(state.step_errors[&id], "unknown node type 'nope'");
    }

    #[test]
    fn status_summary_computes_progress() {
        let def = sample_definition();
        let mut state = RunState::pending(def.id);
        state.record_success(&StepId::from("scan"), ValueMap::new());

        let status = WorkflowStatus::from_parts(&def, &state);
        assert_eq!(status.total_steps, 2);
        assert_eq!(status.completed_steps, 1);
        assert_eq!(status.progress_percentage, 50.0);

        let mut stats = WorkflowStatistics::default();
        stats.record(&status);
        assert_eq!(stats.total_workflows, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed_steps, 1);
    }
}
