//! SQLite state store implementation.
//!
//! Implements `StateStore` from `conductor-core` using sqlx with split
//! read/write pools. Definitions, run states, and checkpoint payloads are
//! stored as JSON text columns; every save overwrites the whole record.

use chrono::{DateTime, SecondsFormat, Utc};
use conductor_core::repository::StateStore;
use conductor_types::error::StorageError;
use conductor_types::workflow::{Checkpoint, RunState, ValueMap, WorkflowDefinition, WorkflowId};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `StateStore`.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DatabasePool,
}

impl SqliteStateStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = DatabasePool::new(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid datetime: {e}")))
}

/// Fixed-width so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn checkpoint_from_row(
    workflow_id: WorkflowId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Checkpoint, StorageError> {
    let name: String = row.try_get("name").map_err(query_err)?;
    let payload: String = row.try_get("payload").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Checkpoint {
        workflow_id,
        name,
        payload: serde_json::from_str(&payload)?,
        created_at: parse_datetime(&created_at)?,
    })
}

// ---------------------------------------------------------------------------
// StateStore impl
// ---------------------------------------------------------------------------

impl StateStore for SqliteStateStore {
    async fn save_workflow_state(&self, state: &RunState) -> Result<(), StorageError> {
        let state_json = serde_json::to_string(state)?;

        sqlx::query(
            r#"INSERT INTO workflow_states (workflow_id, status, state, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(workflow_id) DO UPDATE SET
                 status = excluded.status,
                 state = excluded.state,
                 updated_at = excluded.updated_at"#,
        )
        .bind(state.workflow_id.to_string())
        .bind(state.status.as_str())
        .bind(&state_json)
        .bind(format_datetime(&state.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<RunState>, StorageError> {
        let row = sqlx::query("SELECT state FROM workflow_states WHERE workflow_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let json: String = row.try_get("state").map_err(query_err)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn delete_workflow_state(&self, id: &WorkflowId) -> Result<bool, StorageError> {
        let id = id.to_string();
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let mut affected = 0;
        for table_query in [
            "DELETE FROM workflow_checkpoints WHERE workflow_id = ?",
            "DELETE FROM workflow_states WHERE workflow_id = ?",
            "DELETE FROM workflow_definitions WHERE id = ?",
        ] {
            affected += sqlx::query(table_query)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?
                .rows_affected();
        }

        tx.commit().await.map_err(query_err)?;
        Ok(affected > 0)
    }

    async fn list_workflow_states(&self) -> Result<Vec<RunState>, StorageError> {
        // UUID v7 text sorts by creation time.
        let rows = sqlx::query("SELECT state FROM workflow_states ORDER BY workflow_id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut states = Vec::with_capacity(rows.len());
        for row in &rows {
            let json: String = row.try_get("state").map_err(query_err)?;
            states.push(serde_json::from_str(&json)?);
        }
        Ok(states)
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StorageError> {
        let definition_json = serde_json::to_string(definition)?;

        sqlx::query(
            r#"INSERT INTO workflow_definitions (id, name, definition, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 definition = excluded.definition"#,
        )
        .bind(definition.id.to_string())
        .bind(&definition.name)
        .bind(&definition_json)
        .bind(format_datetime(&definition.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, StorageError> {
        let row = sqlx::query("SELECT definition FROM workflow_definitions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let json: String = row.try_get("definition").map_err(query_err)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&checkpoint.payload)?;

        sqlx::query(
            r#"INSERT INTO workflow_checkpoints (workflow_id, name, payload, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(workflow_id, name) DO UPDATE SET
                 payload = excluded.payload,
                 created_at = excluded.created_at"#,
        )
        .bind(checkpoint.workflow_id.to_string())
        .bind(&checkpoint.name)
        .bind(&payload)
        .bind(format_datetime(&checkpoint.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn list_checkpoints(&self, id: &WorkflowId) -> Result<Vec<Checkpoint>, StorageError> {
        let rows = sqlx::query(
            "SELECT name, payload, created_at FROM workflow_checkpoints WHERE workflow_id = ? ORDER BY created_at ASC, name ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(|row| checkpoint_from_row(*id, row)).collect()
    }

    async fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> Result<Option<ValueMap>, StorageError> {
        let row = sqlx::query(
            "SELECT payload FROM workflow_checkpoints WHERE workflow_id = ? AND name = ?",
        )
        .bind(id.to_string())
        .bind(name)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => {
                let json: String = row.try_get("payload").map_err(query_err)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn delete_checkpoint(&self, id: &WorkflowId, name: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM workflow_checkpoints WHERE workflow_id = ? AND name = ?")
            .bind(id.to_string())
            .bind(name)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::database_url;
    use conductor_types::workflow::{StepDefinition, StepId, WorkflowRunStatus};
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteStateStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::connect(&database_url(dir.path())).await.unwrap();
        (store, dir)
    }

    fn sample_definition() -> WorkflowDefinition {
        let step = |id: &str, node_type: &str| StepDefinition {
            id: StepId::from(id),
            name: id.to_string(),
            description: String::new(),
            node_type: node_type.to_string(),
            inputs: json!({"project_path": "{{ project_path }}", "nested": {"list": [1, "two", null]}})
                .as_object()
                .cloned()
                .unwrap(),
            timeout_secs: Some(30),
            max_attempts: 2,
        };
        let mut dependencies = BTreeMap::new();
        dependencies.insert(StepId::from("log"), [StepId::from("scan")].into_iter().collect());
        WorkflowDefinition {
            id: WorkflowId::new(),
            name: "audit".to_string(),
            description: "scan then log".to_string(),
            steps: vec![step("scan", "scan_project"), step("log", "log_message")],
            dependencies,
            created_at: Utc::now(),
        }
    }

    fn sample_state(id: WorkflowId) -> RunState {
        let mut state = RunState::pending(id);
        state.status = WorkflowRunStatus::Failed;
        state.record_success(
            &StepId::from("scan"),
            json!({"file_count": 2, "files": [{"path": "a.rs"}, {"path": "b.rs"}]})
                .as_object()
                .cloned()
                .unwrap(),
        );
        state.record_failure(&StepId::from("log"), "upstream error: boom");
        state
    }

    #[tokio::test]
    async fn test_definition_round_trip() {
        let (store, _dir) = test_store().await;
        let def = sample_definition();

        store.save_definition(&def).await.unwrap();
        let loaded = store.load_definition(&def.id).await.unwrap().unwrap();
        assert_eq!(loaded, def);

        assert!(store.load_definition(&WorkflowId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_round_trip_and_overwrite() {
        let (store, _dir) = test_store().await;
        let id = WorkflowId::new();

        store.save_workflow_state(&RunState::pending(id)).await.unwrap();
        let state = sample_state(id);
        store.save_workflow_state(&state).await.unwrap();

        let loaded = store.load_workflow_state(&id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.step_outputs[&StepId::from("scan")]["files"][1]["path"], "b.rs");
        assert_eq!(store.list_workflow_states().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_states_ordered_by_creation() {
        let (store, _dir) = test_store().await;
        let first = WorkflowId::new();
        let second = WorkflowId::new();

        store.save_workflow_state(&RunState::pending(second)).await.unwrap();
        store.save_workflow_state(&RunState::pending(first)).await.unwrap();

        let ids: Vec<WorkflowId> = store
            .list_workflow_states()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.workflow_id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_checkpoint_latest_wins() {
        let (store, _dir) = test_store().await;
        let id = WorkflowId::new();
        let start = Utc::now();
        let checkpoint = |name: &str, v: i64| Checkpoint {
            workflow_id: id,
            name: name.to_string(),
            payload: json!({"v": v}).as_object().cloned().unwrap(),
            created_at: start + chrono::Duration::seconds(v),
        };

        store.create_checkpoint(&checkpoint("before_deploy", 1)).await.unwrap();
        store.create_checkpoint(&checkpoint("before_deploy", 2)).await.unwrap();
        store.create_checkpoint(&checkpoint("after deploy/eu", 3)).await.unwrap();

        let restored = store.restore_from_checkpoint(&id, "before_deploy").await.unwrap().unwrap();
        assert_eq!(restored["v"], 2);
        assert!(store.restore_from_checkpoint(&id, "missing").await.unwrap().is_none());

        let list = store.list_checkpoints(&id).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "before_deploy");
        assert_eq!(list[1].name, "after deploy/eu");

        assert!(store.delete_checkpoint(&id, "before_deploy").await.unwrap());
        assert!(!store.delete_checkpoint(&id, "before_deploy").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let (store, _dir) = test_store().await;
        let def = sample_definition();
        store.save_definition(&def).await.unwrap();
        store.save_workflow_state(&sample_state(def.id)).await.unwrap();
        store
            .create_checkpoint(&Checkpoint {
                workflow_id: def.id,
                name: "cp".to_string(),
                payload: ValueMap::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_workflow_state(&def.id).await.unwrap());
        assert!(store.load_definition(&def.id).await.unwrap().is_none());
        assert!(store.load_workflow_state(&def.id).await.unwrap().is_none());
        assert!(store.list_checkpoints(&def.id).await.unwrap().is_empty());
        assert!(!store.delete_workflow_state(&def.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_state_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = database_url(dir.path());
        let state = sample_state(WorkflowId::new());
        {
            let store = SqliteStateStore::connect(&url).await.unwrap();
            store.save_workflow_state(&state).await.unwrap();
        }
        let store = SqliteStateStore::connect(&url).await.unwrap();
        let loaded = store.load_workflow_state(&state.workflow_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }
}
