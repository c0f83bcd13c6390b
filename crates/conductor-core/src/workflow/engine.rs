//! Workflow engine: ready-set DAG scheduling with write-through persistence.
//!
//! The `WorkflowEngine` owns every workflow it knows about (definition plus
//! live `RunState`) and drives execution:
//!
//! 1. Steps whose dependencies have all completed enter the ready set.
//! 2. Ready steps are spawned into a `JoinSet`; an engine-wide `Semaphore`
//!    bounds how many handlers run at once.
//! 3. Each step runs under `tokio::time::timeout` and may be retried.
//! 4. Results flow back to the scheduler loop, which alone mutates the
//!    `RunState`; a failure marks every transitive dependent failed.
//! 5. After every transition the full state is saved through the
//!    `StateStore`. A failed save is logged and flagged, never fatal.
//!
//! Cancellation stops dispatch; steps already running are allowed to finish.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use conductor_types::config::GlobalConfig;
use conductor_types::event::WorkflowEvent;
use conductor_types::workflow::{
    Checkpoint, DependencyMap, RunState, StepDefinition, StepId, StepSpec, ValueMap,
    WorkflowDefinition, WorkflowId, WorkflowRunStatus, WorkflowStatistics, WorkflowStatus,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::event::EventBus;
use crate::repository::state::StateStore;

use super::dag::{self, build_execution_plan};
use super::definition::{WorkflowError, build_definition, validate_definition};
use super::node::NodeContext;
use super::placeholder::{lookup_step_reference, substitute_map};
use super::registry::NodeRegistry;
use super::retry::{RetryPolicy, StepFailure};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default step-level timeout (5 minutes).
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

/// Default bound on concurrently executing steps.
pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 4;

/// Longest accepted checkpoint name.
pub const MAX_CHECKPOINT_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_concurrent_steps: usize,
    /// Applied to steps without their own `timeout_secs`.
    pub step_timeout: Duration,
    /// Fixed pause between attempts of a retried step.
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: DEFAULT_MAX_CONCURRENT_STEPS,
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&GlobalConfig> for EngineConfig {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            max_concurrent_steps: config.max_concurrent_steps.max(1),
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Step tasks
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum StepResult {
    Succeeded(ValueMap),
    Failed(String),
    /// Cancelled while waiting for a concurrency permit.
    NotStarted,
}

#[derive(Debug)]
struct StepOutcome {
    step_id: StepId,
    result: StepResult,
}

/// Everything a spawned step needs, owned so the task is `'static`.
struct StepTask {
    workflow_id: WorkflowId,
    step: StepDefinition,
    context: ValueMap,
    registry: Arc<NodeRegistry>,
    semaphore: Arc<Semaphore>,
    event_bus: EventBus,
    policy: RetryPolicy,
    timeout: Duration,
    token: CancellationToken,
}

impl StepTask {
    async fn run(self) -> StepOutcome {
        let step_id = self.step.id.clone();

        let _permit = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                return StepOutcome { step_id, result: StepResult::NotStarted };
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return StepOutcome { step_id, result: StepResult::NotStarted },
            },
        };

        let mut attempt = 1;
        loop {
            self.event_bus.publish(WorkflowEvent::StepStarted {
                workflow_id: self.workflow_id,
                step_id: step_id.clone(),
                node_type: self.step.node_type.clone(),
                attempt,
            });
            tracing::debug!(
                workflow_id = %self.workflow_id,
                step_id = step_id.as_str(),
                node_type = self.step.node_type.as_str(),
                attempt,
                "running step"
            );

            let started = Instant::now();
            match self.attempt().await {
                Ok(outputs) => {
                    self.event_bus.publish(WorkflowEvent::StepCompleted {
                        workflow_id: self.workflow_id,
                        step_id: step_id.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                    });
                    return StepOutcome {
                        step_id,
                        result: StepResult::Succeeded(outputs),
                    };
                }
                Err(failure) => {
                    let error = failure.to_string();
                    let will_retry = self.policy.should_retry(attempt, &failure)
                        && !self.token.is_cancelled();
                    self.event_bus.publish(WorkflowEvent::StepFailed {
                        workflow_id: self.workflow_id,
                        step_id: step_id.clone(),
                        error: error.clone(),
                        will_retry,
                    });
                    tracing::warn!(
                        workflow_id = %self.workflow_id,
                        step_id = step_id.as_str(),
                        attempt,
                        will_retry,
                        error = %error,
                        "step failed"
                    );
                    if !will_retry {
                        return StepOutcome {
                            step_id,
                            result: StepResult::Failed(error),
                        };
                    }
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One handler invocation. The handler runs in its own task so a panic
    /// or a timeout is contained to this step.
    async fn attempt(&self) -> Result<ValueMap, StepFailure> {
        let inputs = substitute_map(&self.step.inputs, &|key: &str| {
            lookup_step_reference(&self.context, key)
        });
        let ctx = NodeContext::new(self.workflow_id, self.step.id.clone(), self.context.clone());
        let registry = Arc::clone(&self.registry);
        let node_type = self.step.node_type.clone();

        let handle = tokio::spawn(async move { registry.execute(&node_type, inputs, &ctx).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(outputs))) => Ok(outputs),
            Ok(Ok(Err(e))) => Err(StepFailure::Node(e)),
            Ok(Err(join_err)) => Err(StepFailure::Panicked(join_err.to_string())),
            Err(_elapsed) => {
                abort.abort();
                Err(StepFailure::TimedOut(self.timeout))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

struct RunEntry {
    definition: Arc<WorkflowDefinition>,
    state: RunState,
}

/// Exclusive claim on a workflow's run slot, from `WorkflowEngine::reserve_run`.
///
/// While it lives, `is_running` reports the workflow as running and
/// `cancel_workflow` reaches it. Dropping it releases the slot.
#[must_use = "dropping a reservation releases the run slot"]
#[derive(Debug)]
pub struct RunReservation {
    id: WorkflowId,
    token: CancellationToken,
    tokens: Arc<DashMap<WorkflowId, CancellationToken>>,
}

impl RunReservation {
    pub fn workflow_id(&self) -> WorkflowId {
        self.id
    }
}

impl Drop for RunReservation {
    fn drop(&mut self) {
        self.tokens.remove(&self.id);
    }
}

/// Dependency-aware workflow orchestrator.
///
/// Generic over `S: StateStore` for storage flexibility.
pub struct WorkflowEngine<S: StateStore> {
    store: Arc<S>,
    registry: Arc<NodeRegistry>,
    event_bus: EventBus,
    config: EngineConfig,
    /// Shared by every run so the bound is engine-wide.
    semaphore: Arc<Semaphore>,
    runs: DashMap<WorkflowId, RunEntry>,
    /// Cancellation tokens for runs currently executing, shared with
    /// outstanding `RunReservation`s.
    cancellation_tokens: Arc<DashMap<WorkflowId, CancellationToken>>,
}

impl<S: StateStore> WorkflowEngine<S> {
    pub fn new(store: S, registry: NodeRegistry, event_bus: EventBus, config: EngineConfig) -> Self {
        let permits = config.max_concurrent_steps.max(1);
        Self {
            store: Arc::new(store),
            registry: Arc::new(registry),
            event_bus,
            semaphore: Arc::new(Semaphore::new(permits)),
            config: EngineConfig {
                max_concurrent_steps: permits,
                ..config
            },
            runs: DashMap::new(),
            cancellation_tokens: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Creation and loading
    // -----------------------------------------------------------------------

    /// Validate, persist, and register a new workflow.
    ///
    /// Nothing is stored when validation fails.
    pub async fn create_workflow(
        &self,
        name: &str,
        description: &str,
        steps: Vec<StepSpec>,
        dependencies: DependencyMap,
    ) -> Result<WorkflowId, WorkflowError> {
        let definition = build_definition(name, description, steps, dependencies)?;
        self.register_definition(definition).await
    }

    /// Register a prebuilt definition (templates, definition files).
    pub async fn register_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowId, WorkflowError> {
        validate_definition(&definition)?;
        let id = definition.id;
        if self.runs.contains_key(&id) {
            return Err(WorkflowError::AlreadyRunning(id));
        }

        let state = RunState::pending(id);
        self.store.save_definition(&definition).await?;
        self.store.save_workflow_state(&state).await?;

        self.event_bus.publish(WorkflowEvent::WorkflowCreated {
            workflow_id: id,
            name: definition.name.clone(),
            step_count: definition.steps.len(),
        });
        tracing::info!(
            workflow_id = %id,
            name = definition.name.as_str(),
            steps = definition.steps.len(),
            "workflow created"
        );

        self.runs.insert(
            id,
            RunEntry {
                definition: Arc::new(definition),
                state,
            },
        );
        Ok(id)
    }

    /// Hydrate a workflow's definition and state from the store.
    ///
    /// A workflow that is currently executing is left untouched.
    pub async fn load_workflow(&self, id: WorkflowId) -> Result<WorkflowStatus, WorkflowError> {
        if self.is_running(id) {
            return self.get_workflow_status(id).ok_or(WorkflowError::NotFound(id));
        }

        let definition = self
            .store
            .load_definition(&id)
            .await?
            .ok_or(WorkflowError::NotFound(id))?;
        let state = self
            .store
            .load_workflow_state(&id)
            .await?
            .map(recover_interrupted)
            .unwrap_or_else(|| RunState::pending(id));

        let status = WorkflowStatus::from_parts(&definition, &state);
        self.runs.insert(
            id,
            RunEntry {
                definition: Arc::new(definition),
                state,
            },
        );
        tracing::debug!(workflow_id = %id, status = %status.status, "workflow loaded from store");
        Ok(status)
    }

    /// Hydrate every stored workflow. Returns how many were loaded.
    ///
    /// States without a stored definition are skipped with a warning.
    pub async fn load_all_workflows(&self) -> Result<usize, WorkflowError> {
        let states = self.store.list_workflow_states().await?;
        let mut loaded = 0;
        for state in states {
            let id = state.workflow_id;
            if self.is_running(id) {
                continue;
            }
            match self.store.load_definition(&id).await? {
                Some(definition) => {
                    self.runs.insert(
                        id,
                        RunEntry {
                            definition: Arc::new(definition),
                            state: recover_interrupted(state),
                        },
                    );
                    loaded += 1;
                }
                None => {
                    tracing::warn!(workflow_id = %id, "skipping stored state without a definition");
                }
            }
        }
        Ok(loaded)
    }

    // -----------------------------------------------------------------------
    // Queries (memory only)
    // -----------------------------------------------------------------------

    /// Cheap status summary. Never touches the store.
    pub fn get_workflow_status(&self, id: WorkflowId) -> Option<WorkflowStatus> {
        self.runs
            .get(&id)
            .map(|entry| WorkflowStatus::from_parts(&entry.definition, &entry.state))
    }

    pub fn get_run_state(&self, id: WorkflowId) -> Option<RunState> {
        self.runs.get(&id).map(|entry| entry.state.clone())
    }

    pub fn get_definition(&self, id: WorkflowId) -> Option<Arc<WorkflowDefinition>> {
        self.runs.get(&id).map(|entry| Arc::clone(&entry.definition))
    }

    /// Status of every known workflow, oldest first.
    pub fn list_workflows(&self) -> Vec<WorkflowStatus> {
        let mut list: Vec<WorkflowStatus> = self
            .runs
            .iter()
            .map(|entry| WorkflowStatus::from_parts(&entry.definition, &entry.state))
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    pub fn get_statistics(&self) -> WorkflowStatistics {
        let mut stats = WorkflowStatistics::default();
        for status in self.list_workflows() {
            stats.record(&status);
        }
        stats
    }

    pub fn is_running(&self, id: WorkflowId) -> bool {
        self.cancellation_tokens.contains_key(&id)
    }

    /// Parallel waves of the workflow's steps, for plan previews.
    pub fn execution_plan(&self, id: WorkflowId) -> Result<Vec<Vec<StepDefinition>>, WorkflowError> {
        let definition = self.get_definition(id).ok_or(WorkflowError::NotFound(id))?;
        let waves = build_execution_plan(&definition)?;
        Ok(waves
            .into_iter()
            .map(|wave| wave.into_iter().cloned().collect())
            .collect())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Request cancellation of a running workflow.
    ///
    /// Returns `false` if the workflow is known but not running.
    pub fn cancel_workflow(&self, id: WorkflowId) -> Result<bool, WorkflowError> {
        if let Some(token) = self.cancellation_tokens.get(&id) {
            token.cancel();
            tracing::info!(workflow_id = %id, "workflow cancellation requested");
            return Ok(true);
        }
        if self.runs.contains_key(&id) {
            Ok(false)
        } else {
            Err(WorkflowError::NotFound(id))
        }
    }

    /// Remove a workflow from memory and the store (checkpoints included).
    pub async fn delete_workflow(&self, id: WorkflowId) -> Result<bool, WorkflowError> {
        if self.is_running(id) {
            return Err(WorkflowError::AlreadyRunning(id));
        }
        let in_memory = self.runs.remove(&id).is_some();
        let in_store = self.store.delete_workflow_state(&id).await?;
        if in_memory || in_store {
            tracing::info!(workflow_id = %id, "workflow deleted");
        }
        Ok(in_memory || in_store)
    }

    /// Reload a workflow from the store and execute its remaining steps.
    pub async fn resume_workflow(&self, id: WorkflowId) -> Result<bool, WorkflowError> {
        if self.is_running(id) {
            return Err(WorkflowError::AlreadyRunning(id));
        }
        self.load_workflow(id).await?;
        self.execute_workflow(id).await
    }

    /// Claim the run slot of a workflow, loading it from the store first if
    /// needed. Fails with `AlreadyRunning` if another run holds the slot.
    ///
    /// The slot is held until the reservation is passed to `run_reserved`
    /// and that run ends, or until the reservation is dropped.
    pub async fn reserve_run(&self, id: WorkflowId) -> Result<RunReservation, WorkflowError> {
        if !self.runs.contains_key(&id) {
            self.load_workflow(id).await?;
        }

        match self.cancellation_tokens.entry(id) {
            Entry::Occupied(_) => Err(WorkflowError::AlreadyRunning(id)),
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(token.clone());
                Ok(RunReservation {
                    id,
                    token,
                    tokens: Arc::clone(&self.cancellation_tokens),
                })
            }
        }
    }

    /// Execute a previously reserved run to a terminal status.
    pub async fn run_reserved(&self, reservation: RunReservation) -> Result<bool, WorkflowError> {
        let result = self.run_to_completion(reservation.id, &reservation.token).await;
        drop(reservation);
        result.map(|status| status == WorkflowRunStatus::Completed)
    }

    /// Execute a workflow to a terminal status.
    ///
    /// Steps already in `completed_steps` are skipped, so executing a failed
    /// or cancelled run retries only what did not complete. Returns `true`
    /// iff every step completed.
    pub async fn execute_workflow(&self, id: WorkflowId) -> Result<bool, WorkflowError> {
        let reservation = self.reserve_run(id).await?;
        self.run_reserved(reservation).await
    }

    async fn run_to_completion(
        &self,
        id: WorkflowId,
        token: &CancellationToken,
    ) -> Result<WorkflowRunStatus, WorkflowError> {
        let (definition, mut state) = {
            let entry = self.runs.get(&id).ok_or(WorkflowError::NotFound(id))?;
            (Arc::clone(&entry.definition), entry.state.clone())
        };

        state.failed_steps.clear();
        state.step_errors.clear();
        state.running_steps.clear();
        state.unpersisted = false;
        state.status = WorkflowRunStatus::Running;
        state.started_at = Some(Utc::now());
        state.completed_at = None;
        state.touch();

        let dependents = dag::dependents_map(&definition);
        let mut waiting: HashMap<StepId, usize> = HashMap::new();
        let mut ready: VecDeque<StepId> = VecDeque::new();
        for step in &definition.steps {
            if state.is_completed(&step.id) {
                continue;
            }
            let open = definition
                .dependencies_of(&step.id)
                .filter(|dep| !state.is_completed(dep))
                .count();
            if open == 0 {
                ready.push_back(step.id.clone());
            }
            waiting.insert(step.id.clone(), open);
        }

        let run_start = Instant::now();
        self.event_bus.publish(WorkflowEvent::RunStarted {
            workflow_id: id,
            pending_steps: waiting.len(),
        });
        tracing::info!(
            workflow_id = %id,
            name = definition.name.as_str(),
            pending = waiting.len(),
            skipping = state.completed_steps.len(),
            "starting workflow execution"
        );
        self.commit(&mut state).await;

        let mut join_set: JoinSet<StepOutcome> = JoinSet::new();
        let mut cancelled = false;

        loop {
            if !cancelled && token.is_cancelled() {
                cancelled = true;
                tracing::info!(
                    workflow_id = %id,
                    in_flight = join_set.len(),
                    "cancellation requested, draining in-flight steps"
                );
            }

            if !cancelled && !ready.is_empty() {
                while let Some(step_id) = ready.pop_front() {
                    let Some(step) = definition.step(step_id.as_str()) else {
                        continue;
                    };
                    state.running_steps.insert(step_id.clone());
                    join_set.spawn(self.step_task(id, step, &state.context, token).run());
                }
                state.touch();
                self.commit(&mut state).await;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(workflow_id = %id, error = %e, "step task aborted");
                    continue;
                }
            };

            match outcome.result {
                StepResult::Succeeded(outputs) => {
                    state.record_success(&outcome.step_id, outputs);
                    for dependent in dependents.get(&outcome.step_id).into_iter().flatten() {
                        if let Some(open) = waiting.get_mut(dependent) {
                            *open = open.saturating_sub(1);
                            if *open == 0 && !state.failed_steps.contains(dependent) {
                                ready.push_back(dependent.clone());
                            }
                        }
                    }
                }
                StepResult::Failed(error) => {
                    state.record_failure(&outcome.step_id, error);
                    self.cascade_failure(&definition, &mut state, &outcome.step_id);
                }
                StepResult::NotStarted => {
                    state.running_steps.remove(&outcome.step_id);
                }
            }
            self.commit(&mut state).await;
        }

        state.running_steps.clear();
        let all_completed = definition.steps.iter().all(|s| state.is_completed(&s.id));
        state.status = if all_completed {
            WorkflowRunStatus::Completed
        } else if cancelled || token.is_cancelled() {
            WorkflowRunStatus::Cancelled
        } else {
            WorkflowRunStatus::Failed
        };
        state.completed_at = Some(Utc::now());
        state.touch();
        self.commit(&mut state).await;

        let duration_ms = run_start.elapsed().as_millis() as u64;
        self.event_bus.publish(WorkflowEvent::RunFinished {
            workflow_id: id,
            status: state.status,
            duration_ms,
        });
        tracing::info!(
            workflow_id = %id,
            status = %state.status,
            completed = state.completed_steps.len(),
            failed = state.failed_steps.len(),
            duration_ms,
            "workflow execution finished"
        );

        Ok(state.status)
    }

    fn step_task(
        &self,
        workflow_id: WorkflowId,
        step: &StepDefinition,
        context: &ValueMap,
        token: &CancellationToken,
    ) -> StepTask {
        StepTask {
            workflow_id,
            step: step.clone(),
            context: context.clone(),
            registry: Arc::clone(&self.registry),
            semaphore: Arc::clone(&self.semaphore),
            event_bus: self.event_bus.clone(),
            policy: RetryPolicy::for_step(step, self.config.retry_delay),
            timeout: step
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.config.step_timeout),
            token: token.clone(),
        }
    }

    /// Mark every not-yet-finished transitive dependent of `failed` as failed.
    fn cascade_failure(&self, definition: &WorkflowDefinition, state: &mut RunState, failed: &StepId) {
        let reason = format!("dependency '{failed}' failed");
        for dependent in dag::transitive_dependents(definition, failed) {
            if state.is_completed(&dependent) || state.failed_steps.contains(&dependent) {
                continue;
            }
            state.record_failure(&dependent, reason.clone());
            self.event_bus.publish(WorkflowEvent::StepSkipped {
                workflow_id: state.workflow_id,
                step_id: dependent.clone(),
                reason: reason.clone(),
            });
            tracing::debug!(
                workflow_id = %state.workflow_id,
                step_id = dependent.as_str(),
                reason = reason.as_str(),
                "step skipped"
            );
        }
    }

    /// Write the state through to the store, then mirror it in memory.
    ///
    /// A failed save flags the state `unpersisted` and execution continues.
    async fn commit(&self, state: &mut RunState) {
        if let Err(e) = self.store.save_workflow_state(state).await {
            state.unpersisted = true;
            tracing::warn!(
                workflow_id = %state.workflow_id,
                error = %e,
                "failed to persist workflow state, continuing"
            );
            self.event_bus.publish(WorkflowEvent::StatePersistFailed {
                workflow_id: state.workflow_id,
                error: e.to_string(),
            });
        }
        if let Some(mut entry) = self.runs.get_mut(&state.workflow_id) {
            entry.state = state.clone();
        }
    }

    // -----------------------------------------------------------------------
    // Checkpoints (pass-through; never touch RunState)
    // -----------------------------------------------------------------------

    async fn ensure_known(&self, id: WorkflowId) -> Result<(), WorkflowError> {
        if self.runs.contains_key(&id) || self.store.load_definition(&id).await?.is_some() {
            Ok(())
        } else {
            Err(WorkflowError::NotFound(id))
        }
    }

    /// Store a named checkpoint. A later checkpoint with the same name
    /// replaces the earlier one.
    pub async fn create_checkpoint(
        &self,
        id: WorkflowId,
        name: &str,
        payload: ValueMap,
    ) -> Result<Checkpoint, WorkflowError> {
        let name = name.trim();
        if name.is_empty()
            || name.len() > MAX_CHECKPOINT_NAME_LEN
            || name.chars().any(char::is_control)
        {
            return Err(WorkflowError::InvalidCheckpointName(name.to_string()));
        }
        self.ensure_known(id).await?;

        let checkpoint = Checkpoint {
            workflow_id: id,
            name: name.to_string(),
            payload,
            created_at: Utc::now(),
        };
        self.store.create_checkpoint(&checkpoint).await?;
        tracing::info!(workflow_id = %id, checkpoint = name, "checkpoint created");
        Ok(checkpoint)
    }

    pub async fn list_checkpoints(&self, id: WorkflowId) -> Result<Vec<Checkpoint>, WorkflowError> {
        self.ensure_known(id).await?;
        Ok(self.store.list_checkpoints(&id).await?)
    }

    /// Payload of a named checkpoint, or `None` if it does not exist.
    pub async fn restore_checkpoint(
        &self,
        id: WorkflowId,
        name: &str,
    ) -> Result<Option<ValueMap>, WorkflowError> {
        self.ensure_known(id).await?;
        Ok(self.store.restore_from_checkpoint(&id, name.trim()).await?)
    }

    pub async fn delete_checkpoint(&self, id: WorkflowId, name: &str) -> Result<bool, WorkflowError> {
        self.ensure_known(id).await?;
        Ok(self.store.delete_checkpoint(&id, name.trim()).await?)
    }
}

/// A stored `running` state has no live run behind it in this process, so
/// it is loaded as `failed` with nothing in flight. Resuming re-runs the
/// steps that had not completed.
fn recover_interrupted(mut state: RunState) -> RunState {
    if state.status == WorkflowRunStatus::Running {
        tracing::warn!(
            workflow_id = %state.workflow_id,
            in_flight = state.running_steps.len(),
            "stored run was interrupted, marking it failed"
        );
        state.status = WorkflowRunStatus::Failed;
        state.running_steps.clear();
        state.touch();
    }
    state
}

impl<S: StateStore> std::fmt::Debug for WorkflowEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.runs.len())
            .field("running", &self.cancellation_tokens.len())
            .field("config", &self.config)
            .finish()
    }
}
