//! Application state wiring the engine, store, and catalog together.
//!
//! AppState holds the concrete service instance used by both CLI and REST API.
//! `WorkflowService` is generic over the state store; AppState pins it to
//! [`AppStore`], which picks the backend named in `config.toml` at runtime.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use conductor_core::event::EventBus;
use conductor_core::repository::{InMemoryStateStore, StateStore};
use conductor_core::service::WorkflowService;
use conductor_core::workflow::collaborators::UnconfiguredChat;
use conductor_core::workflow::nodes::register_builtin_nodes;
use conductor_core::workflow::{EngineConfig, NodeRegistry, TemplateCatalog, WorkflowEngine};
use conductor_infra::config::load_global_config;
use conductor_infra::filesystem::{JsonFileStateStore, resolve_data_dir, workflows_dir};
use conductor_infra::scanner::FilesystemScanner;
use conductor_infra::sqlite::SqliteStateStore;
use conductor_infra::sqlite::pool::database_url;
use conductor_types::config::{GlobalConfig, StorageBackend};
use conductor_types::error::StorageError;
use conductor_types::workflow::{Checkpoint, RunState, ValueMap, WorkflowDefinition, WorkflowId};

/// Runtime-selected state store backend.
pub enum AppStore {
    Sqlite(SqliteStateStore),
    Json(JsonFileStateStore),
    Memory(InMemoryStateStore),
}

impl AppStore {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Json(_) => "json",
            Self::Memory(_) => "memory",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AppStore::Sqlite($store) => $call.await,
            AppStore::Json($store) => $call.await,
            AppStore::Memory($store) => $call.await,
        }
    };
}

impl StateStore for AppStore {
    async fn save_workflow_state(&self, state: &RunState) -> Result<(), StorageError> {
        delegate!(self, s => s.save_workflow_state(state))
    }

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<RunState>, StorageError> {
        delegate!(self, s => s.load_workflow_state(id))
    }

    async fn delete_workflow_state(&self, id: &WorkflowId) -> Result<bool, StorageError> {
        delegate!(self, s => s.delete_workflow_state(id))
    }

    async fn list_workflow_states(&self) -> Result<Vec<RunState>, StorageError> {
        delegate!(self, s => s.list_workflow_states())
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StorageError> {
        delegate!(self, s => s.save_definition(definition))
    }

    async fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, StorageError> {
        delegate!(self, s => s.load_definition(id))
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        delegate!(self, s => s.create_checkpoint(checkpoint))
    }

    async fn list_checkpoints(&self, id: &WorkflowId) -> Result<Vec<Checkpoint>, StorageError> {
        delegate!(self, s => s.list_checkpoints(id))
    }

    async fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> Result<Option<ValueMap>, StorageError> {
        delegate!(self, s => s.restore_from_checkpoint(id, name))
    }

    async fn delete_checkpoint(&self, id: &WorkflowId, name: &str) -> Result<bool, StorageError> {
        delegate!(self, s => s.delete_checkpoint(id, name))
    }
}

/// Concrete type alias for the service generic pinned to the app store.
pub type ConcreteWorkflowService = WorkflowService<AppStore>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, open the store, wire
    /// the engine, and hydrate every stored workflow.
    ///
    /// `ephemeral` keeps everything in memory for this process only.
    pub async fn init(ephemeral: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;

        let store = if ephemeral {
            AppStore::Memory(InMemoryStateStore::new())
        } else {
            match config.storage {
                StorageBackend::Sqlite => AppStore::Sqlite(
                    SqliteStateStore::connect(&database_url(&data_dir))
                        .await
                        .context("Failed to open the state database")?,
                ),
                StorageBackend::Json => {
                    AppStore::Json(JsonFileStateStore::new(workflows_dir(&data_dir)))
                }
            }
        };

        let state = Self::with_store(store, config, data_dir);
        let loaded = state
            .workflow_service
            .engine()
            .load_all_workflows()
            .await
            .context("Failed to load stored workflows")?;
        tracing::debug!(loaded, "workflows hydrated from store");

        Ok(state)
    }

    /// Wire the engine and catalog around an already-open store.
    pub fn with_store(store: AppStore, config: GlobalConfig, data_dir: PathBuf) -> Self {
        let mut registry = NodeRegistry::new();
        register_builtin_nodes(&mut registry, UnconfiguredChat, FilesystemScanner::new());

        tracing::debug!(backend = store.backend_name(), "state store selected");
        let engine = WorkflowEngine::new(
            store,
            registry,
            EventBus::new(config.event_capacity),
            EngineConfig::from(&config),
        );
        let service = WorkflowService::new(Arc::new(engine), TemplateCatalog::builtin());

        Self {
            workflow_service: Arc::new(service),
            config,
            data_dir,
        }
    }

    /// In-memory state with default configuration.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_store(
            AppStore::Memory(InMemoryStateStore::new()),
            GlobalConfig::default(),
            PathBuf::from("."),
        )
    }
}
