//! JSON-file `StateStore`.
//!
//! Layout under the store root:
//!
//! ```text
//! {root}/{workflow_id}/definition.json
//! {root}/{workflow_id}/state.json
//! {root}/{workflow_id}/checkpoints/{encoded name}.json
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed into place,
//! so a crash never leaves a half-written record behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use conductor_core::repository::StateStore;
use conductor_core::repository::state::sort_checkpoints;
use conductor_types::error::StorageError;
use conductor_types::workflow::{Checkpoint, RunState, ValueMap, WorkflowDefinition, WorkflowId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

const DEFINITION_FILE: &str = "definition.json";
const STATE_FILE: &str = "state.json";
const CHECKPOINTS_DIR: &str = "checkpoints";

/// Longest encoded stem stored verbatim; leaves room for `.json` and the
/// temp-file affixes under the common 255-byte file name limit.
const MAX_ENCODED_STEM: usize = 200;

/// Readable prefix kept in front of the digest for oversized stems.
const HASHED_STEM_PREFIX: usize = 64;

/// File-per-record store rooted at a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    root: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_dir(&self, id: &WorkflowId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn checkpoint_path(&self, id: &WorkflowId, name: &str) -> PathBuf {
        self.workflow_dir(id)
            .join(CHECKPOINTS_DIR)
            .join(format!("{}.json", encode_checkpoint_name(name)))
    }
}

/// Map a checkpoint name to a safe file stem.
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`. Stems longer than `MAX_ENCODED_STEM` are shortened to a prefix plus
/// `~` and the SHA-256 of the name. `~` never appears in a verbatim stem, so
/// the two forms cannot collide. The full name lives inside the record.
pub fn encode_checkpoint_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }

    if out.len() > MAX_ENCODED_STEM {
        // The stem is pure ASCII, so any byte index is a char boundary.
        out.truncate(HASHED_STEM_PREFIX);
        out.push('~');
        out.push_str(&format!("{:x}", Sha256::digest(name.as_bytes())));
    }
    out
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file(path: &Path) -> Result<bool, StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl StateStore for JsonFileStateStore {
    async fn save_workflow_state(&self, state: &RunState) -> Result<(), StorageError> {
        write_json(&self.workflow_dir(&state.workflow_id).join(STATE_FILE), state).await
    }

    async fn load_workflow_state(&self, id: &WorkflowId) -> Result<Option<RunState>, StorageError> {
        read_json(&self.workflow_dir(id).join(STATE_FILE)).await
    }

    async fn delete_workflow_state(&self, id: &WorkflowId) -> Result<bool, StorageError> {
        match tokio::fs::remove_dir_all(self.workflow_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_workflow_states(&self) -> Result<Vec<RunState>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut states = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(id) = entry.file_name().to_string_lossy().parse::<WorkflowId>() else {
                continue;
            };
            if let Some(state) = self.load_workflow_state(&id).await? {
                states.push(state);
            }
        }
        // UUID v7 ids sort by creation time.
        states.sort_by_key(|s: &RunState| s.workflow_id);
        Ok(states)
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StorageError> {
        write_json(&self.workflow_dir(&definition.id).join(DEFINITION_FILE), definition).await
    }

    async fn load_definition(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>, StorageError> {
        read_json(&self.workflow_dir(id).join(DEFINITION_FILE)).await
    }

    async fn create_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        write_json(
            &self.checkpoint_path(&checkpoint.workflow_id, &checkpoint.name),
            checkpoint,
        )
        .await
    }

    async fn list_checkpoints(&self, id: &WorkflowId) -> Result<Vec<Checkpoint>, StorageError> {
        let dir = self.workflow_dir(id).join(CHECKPOINTS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(checkpoint) = read_json::<Checkpoint>(&path).await? {
                checkpoints.push(checkpoint);
            }
        }
        sort_checkpoints(&mut checkpoints);
        Ok(checkpoints)
    }

    async fn restore_from_checkpoint(
        &self,
        id: &WorkflowId,
        name: &str,
    ) -> Result<Option<ValueMap>, StorageError> {
        let checkpoint: Option<Checkpoint> = read_json(&self.checkpoint_path(id, name)).await?;
        Ok(checkpoint.map(|c| c.payload))
    }

    async fn delete_checkpoint(&self, id: &WorkflowId, name: &str) -> Result<bool, StorageError> {
        remove_file(&self.checkpoint_path(id, name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conductor_types::workflow::{StepId, WorkflowRunStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (JsonFileStateStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (JsonFileStateStore::new(dir.path().join("workflows")), dir)
    }

    fn map(v: serde_json::Value) -> ValueMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_encode_checkpoint_name() {
        assert_eq!(encode_checkpoint_name("before_deploy-1"), "before_deploy-1");
        assert_eq!(encode_checkpoint_name("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_checkpoint_name("a b"), "a%20b");
        assert_ne!(encode_checkpoint_name("a/b"), encode_checkpoint_name("a_b"));
    }

    #[test]
    fn test_encode_long_checkpoint_name_is_bounded() {
        let long = "é".repeat(64);
        let stem = encode_checkpoint_name(&long);
        assert_eq!(stem.len(), HASHED_STEM_PREFIX + 1 + 64);
        assert!(stem.contains('~'));
        assert!(stem.starts_with("%C3%A9"));

        // Same prefix, different tail.
        let other = format!("{}è", "é".repeat(63));
        assert_ne!(encode_checkpoint_name(&other), stem);

        let at_limit = "a".repeat(MAX_ENCODED_STEM);
        assert_eq!(encode_checkpoint_name(&at_limit), at_limit);
    }

    #[tokio::test]
    async fn test_long_non_ascii_checkpoint_name_round_trips() {
        let (store, _dir) = store();
        let id = WorkflowId::new();
        let name = "é".repeat(64);
        store
            .create_checkpoint(&Checkpoint {
                workflow_id: id,
                name: name.clone(),
                payload: map(json!({"cursor": 9})),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let restored = store.restore_from_checkpoint(&id, &name).await.unwrap().unwrap();
        assert_eq!(restored["cursor"], 9);

        let listed = store.list_checkpoints(&id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, name);

        assert!(store.delete_checkpoint(&id, &name).await.unwrap());
        assert!(store.list_checkpoints(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_round_trip_with_nested_values() {
        let (store, _dir) = store();
        let id = WorkflowId::new();
        let mut state = RunState::pending(id);
        state.status = WorkflowRunStatus::Completed;
        state.record_success(
            &StepId::from("scan"),
            map(json!({"files": [{"path": "a.rs", "size_bytes": 3}], "meta": {"deep": {"x": [1, 2, 3]}}})),
        );

        store.save_workflow_state(&state).await.unwrap();
        let loaded = store.load_workflow_state(&id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(store.load_workflow_state(&WorkflowId::new()).await.unwrap().is_none());

        // No temp files left behind.
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(store.root().join(id.to_string())).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["state.json"]);
    }

    #[tokio::test]
    async fn test_list_states_skips_foreign_entries() {
        let (store, _dir) = store();
        let first = WorkflowId::new();
        let second = WorkflowId::new();
        store.save_workflow_state(&RunState::pending(second)).await.unwrap();
        store.save_workflow_state(&RunState::pending(first)).await.unwrap();
        tokio::fs::create_dir_all(store.root().join("not-a-workflow")).await.unwrap();

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
    async fn test_list_states_empty_root() {
        let (store, _dir) = store();
        assert!(store.list_workflow_states().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoints_latest_wins_and_ordering() {
        let (store, _dir) = store();
        let id = WorkflowId::new();
        let start = Utc::now();
        let checkpoint = |name: &str, v: i64| Checkpoint {
            workflow_id: id,
            name: name.to_string(),
            payload: map(json!({"v": v})),
            created_at: start + chrono::Duration::seconds(v),
        };

        store.create_checkpoint(&checkpoint("before deploy", 1)).await.unwrap();
        store.create_checkpoint(&checkpoint("../escape", 2)).await.unwrap();
        store.create_checkpoint(&checkpoint("before deploy", 3)).await.unwrap();

        let restored = store.restore_from_checkpoint(&id, "before deploy").await.unwrap().unwrap();
        assert_eq!(restored["v"], 3);

        let names: Vec<String> = store
            .list_checkpoints(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["../escape", "before deploy"]);

        assert!(store.delete_checkpoint(&id, "../escape").await.unwrap());
        assert!(!store.delete_checkpoint(&id, "../escape").await.unwrap());
        assert!(store.restore_from_checkpoint(&id, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_workflow() {
        let (store, _dir) = store();
        let id = WorkflowId::new();
        store.save_workflow_state(&RunState::pending(id)).await.unwrap();
        store
            .create_checkpoint(&Checkpoint {
                workflow_id: id,
                name: "cp".into(),
                payload: ValueMap::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.delete_workflow_state(&id).await.unwrap());
        assert!(store.load_workflow_state(&id).await.unwrap().is_none());
        assert!(store.list_checkpoints(&id).await.unwrap().is_empty());
        assert!(!store.delete_workflow_state(&id).await.unwrap());
    }
}
