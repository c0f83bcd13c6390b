//! Built-in node handlers.
//!
//! | node type     | inputs                                   | outputs                                      |
//! |---------------|------------------------------------------|----------------------------------------------|
//! | `log_message` | `message`, `level` (default `info`)      | `message`, `level`                           |
//! | `sleep`       | `duration` (seconds, float)              | `slept_duration`                             |
//! | `conditional` | `condition`, `true_value`, `false_value` | `result`, `branch_taken`                     |
//! | `ai_chat`     | `prompt`, `system_message`               | `ai_response`, `prompt`                      |
//! | `scan_project`| `project_path`, `extensions`, `max_files`| `project_path`, `files`, `file_count`, `total_bytes` |

use std::path::PathBuf;
use std::time::Duration;

use conductor_types::error::NodeError;
use conductor_types::workflow::ValueMap;
use serde_json::{Value, json};

use super::collaborators::{ChatCompletion, ChatRequest, ProjectScanner, ScanRequest};
use super::node::{NodeContext, NodeHandler};
use super::placeholder::value_to_string;
use super::registry::NodeRegistry;

pub const LOG_MESSAGE: &str = "log_message";
pub const SLEEP: &str = "sleep";
pub const CONDITIONAL: &str = "conditional";
pub const AI_CHAT: &str = "ai_chat";
pub const SCAN_PROJECT: &str = "scan_project";

/// Register the five built-in nodes.
pub fn register_builtin_nodes<C, P>(registry: &mut NodeRegistry, chat: C, scanner: P)
where
    C: ChatCompletion + 'static,
    P: ProjectScanner + 'static,
{
    registry.register(LOG_MESSAGE, LogMessageNode);
    registry.register(SLEEP, SleepNode);
    registry.register(CONDITIONAL, ConditionalNode);
    registry.register(AI_CHAT, AiChatNode::new(chat));
    registry.register(SCAN_PROJECT, ScanProjectNode::new(scanner));
}

fn object(value: Value) -> ValueMap {
    match value {
        Value::Object(map) => map,
        _ => ValueMap::new(),
    }
}

fn required_str<'a>(inputs: &'a ValueMap, key: &str) -> Result<&'a str, NodeError> {
    match inputs.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(NodeError::InvalidInput(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(NodeError::InvalidInput(format!("missing required input '{key}'"))),
    }
}

/// JSON truthiness: null, false, 0, "", [] and {} are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// log_message
// ---------------------------------------------------------------------------

pub struct LogMessageNode;

impl NodeHandler for LogMessageNode {
    async fn execute(&self, inputs: ValueMap, ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        let message = inputs.get("message").map(value_to_string).unwrap_or_default();
        let level = match inputs.get("level") {
            None | Some(Value::Null) => "info".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(NodeError::InvalidInput(format!(
                    "'level' must be a string, got {other}"
                )));
            }
        };

        let workflow_id = ctx.workflow_id;
        let step_id = ctx.step_id.as_str();
        match level.to_lowercase().as_str() {
            "trace" => tracing::trace!(workflow_id = %workflow_id, step_id, "{message}"),
            "debug" => tracing::debug!(workflow_id = %workflow_id, step_id, "{message}"),
            "info" => tracing::info!(workflow_id = %workflow_id, step_id, "{message}"),
            "warn" | "warning" => tracing::warn!(workflow_id = %workflow_id, step_id, "{message}"),
            "error" | "critical" => tracing::error!(workflow_id = %workflow_id, step_id, "{message}"),
            other => {
                return Err(NodeError::InvalidInput(format!("unknown log level '{other}'")));
            }
        }

        Ok(object(json!({ "message": message, "level": level })))
    }
}

// ---------------------------------------------------------------------------
// sleep
// ---------------------------------------------------------------------------

pub struct SleepNode;

impl NodeHandler for SleepNode {
    async fn execute(&self, inputs: ValueMap, _ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        let duration = inputs
            .get("duration")
            .ok_or_else(|| NodeError::InvalidInput("missing required input 'duration'".into()))?;
        let secs = duration
            .as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| {
                NodeError::InvalidInput(format!(
                    "'duration' must be a non-negative number of seconds, got {duration}"
                ))
            })?;

        let pause = Duration::try_from_secs_f64(secs)
            .map_err(|e| NodeError::InvalidInput(format!("'duration' out of range: {e}")))?;
        tokio::time::sleep(pause).await;

        Ok(object(json!({ "slept_duration": duration })))
    }
}

// ---------------------------------------------------------------------------
// conditional
// ---------------------------------------------------------------------------

pub struct ConditionalNode;

impl NodeHandler for ConditionalNode {
    async fn execute(&self, inputs: ValueMap, _ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        let taken = inputs.get("condition").is_some_and(is_truthy);
        let (result, branch) = if taken {
            (inputs.get("true_value"), "true")
        } else {
            (inputs.get("false_value"), "false")
        };

        Ok(object(json!({
            "result": result.cloned().unwrap_or(Value::Null),
            "branch_taken": branch,
        })))
    }
}

// ---------------------------------------------------------------------------
// ai_chat
// ---------------------------------------------------------------------------

pub struct AiChatNode<C> {
    chat: C,
}

impl<C: ChatCompletion> AiChatNode<C> {
    pub fn new(chat: C) -> Self {
        Self { chat }
    }
}

impl<C: ChatCompletion> NodeHandler for AiChatNode<C> {
    async fn execute(&self, inputs: ValueMap, ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        let prompt = required_str(&inputs, "prompt")?.to_string();
        let system_message = match inputs.get("system_message") {
            None | Some(Value::Null) => None,
            Some(v) => Some(value_to_string(v)),
        };
        let request = ChatRequest {
            prompt,
            system_message,
        };

        tracing::debug!(
            workflow_id = %ctx.workflow_id,
            step_id = ctx.step_id.as_str(),
            prompt_len = request.prompt.len(),
            "sending chat request"
        );

        let response = self
            .chat
            .complete(&request)
            .await
            .map_err(|e| NodeError::Upstream(e.to_string()))?;

        Ok(object(json!({
            "ai_response": response,
            "prompt": request.prompt,
        })))
    }
}

// ---------------------------------------------------------------------------
// scan_project
// ---------------------------------------------------------------------------

pub struct ScanProjectNode<P> {
    scanner: P,
}

impl<P: ProjectScanner> ScanProjectNode<P> {
    pub fn new(scanner: P) -> Self {
        Self { scanner }
    }
}

impl<P: ProjectScanner> NodeHandler for ScanProjectNode<P> {
    async fn execute(&self, inputs: ValueMap, _ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        let project_path = required_str(&inputs, "project_path")?.to_string();
        let extensions = match inputs.get("extensions") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| value_to_string(v).trim_start_matches('.').to_lowercase())
                .collect(),
            Some(other) => {
                return Err(NodeError::InvalidInput(format!(
                    "'extensions' must be a list, got {other}"
                )));
            }
        };
        let max_files = match inputs.get("max_files") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                NodeError::InvalidInput(format!("'max_files' must be a non-negative integer, got {v}"))
            })? as usize),
        };

        let request = ScanRequest {
            root: PathBuf::from(&project_path),
            extensions,
            max_files,
        };
        let scan = self
            .scanner
            .scan(&request)
            .await
            .map_err(|e| NodeError::Upstream(e.to_string()))?;

        Ok(object(json!({
            "project_path": project_path,
            "file_count": scan.files.len(),
            "total_bytes": scan.total_bytes(),
            "files": scan.files,
        })))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::collaborators::{CollaboratorError, ProjectScan, ScannedFile, UnconfiguredChat};
    use conductor_types::workflow::{StepId, WorkflowId};

    struct EchoChat;

    impl ChatCompletion for EchoChat {
        async fn complete(&self, request: &ChatRequest) -> Result<String, CollaboratorError> {
            Ok(format!("echo: {}", request.prompt))
        }
    }

    struct FixedScanner;

    impl ProjectScanner for FixedScanner {
        async fn scan(&self, request: &ScanRequest) -> Result<ProjectScan, CollaboratorError> {
            if request.root.as_os_str() == "missing" {
                return Err(CollaboratorError("no such directory".into()));
            }
            Ok(ProjectScan {
                files: vec![
                    ScannedFile { path: "src/lib.rs".into(), size_bytes: 10 },
                    ScannedFile { path: "src/main.rs".into(), size_bytes: 5 },
                ],
            })
        }
    }

    fn ctx() -> NodeContext {
        NodeContext::new(WorkflowId::new(), StepId::from("s"), ValueMap::new())
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        register_builtin_nodes(&mut registry, EchoChat, FixedScanner);
        registry
    }

    async fn run(node: &str, inputs: Value) -> Result<ValueMap, NodeError> {
        registry().execute(node, object(inputs), &ctx()).await
    }

    #[test]
    fn all_builtins_registered() {
        assert_eq!(
            registry().available_nodes(),
            vec!["ai_chat", "conditional", "log_message", "scan_project", "sleep"]
        );
    }

    #[tokio::test]
    async fn log_message_echoes() {
        let out = run(LOG_MESSAGE, json!({"message": "hello", "level": "WARNING"})).await.unwrap();
        assert_eq!(out["message"], "hello");
        assert_eq!(out["level"], "WARNING");

        let out = run(LOG_MESSAGE, json!({"message": "hi"})).await.unwrap();
        assert_eq!(out["level"], "info");

        let err = run(LOG_MESSAGE, json!({"message": "x", "level": "loud"})).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn sleep_reports_duration() {
        let out = run(SLEEP, json!({"duration": 0.01})).await.unwrap();
        assert_eq!(out["slept_duration"], 0.01);

        assert!(matches!(
            run(SLEEP, json!({"duration": -1})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
        assert!(matches!(
            run(SLEEP, json!({})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
        assert!(matches!(
            run(SLEEP, json!({"duration": "soon"})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
        assert!(matches!(
            run(SLEEP, json!({"duration": 1e20})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn conditional_branches() {
        let out = run(
            CONDITIONAL,
            json!({"condition": true, "true_value": "yes", "false_value": "no"}),
        )
        .await
        .unwrap();
        assert_eq!(out["result"], "yes");
        assert_eq!(out["branch_taken"], "true");

        let out = run(
            CONDITIONAL,
            json!({"condition": false, "true_value": "yes", "false_value": "no"}),
        )
        .await
        .unwrap();
        assert_eq!(out["result"], "no");
        assert_eq!(out["branch_taken"], "false");
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("x"), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[tokio::test]
    async fn ai_chat_uses_collaborator() {
        let out = run(AI_CHAT, json!({"prompt": "Review this"})).await.unwrap();
        assert_eq!(out["ai_response"], "echo: Review this");
        assert_eq!(out["prompt"], "Review this");

        assert!(matches!(
            run(AI_CHAT, json!({})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn unconfigured_chat_is_upstream_error() {
        let mut registry = NodeRegistry::new();
        register_builtin_nodes(&mut registry, UnconfiguredChat, FixedScanner);
        let err = registry
            .execute(AI_CHAT, object(json!({"prompt": "hi"})), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Upstream(_)));
    }

    #[tokio::test]
    async fn scan_project_summarizes() {
        let out = run(SCAN_PROJECT, json!({"project_path": "."})).await.unwrap();
        assert_eq!(out["project_path"], ".");
        assert_eq!(out["file_count"], 2);
        assert_eq!(out["total_bytes"], 15);
        assert_eq!(out["files"][0]["path"], "src/lib.rs");

        assert!(matches!(
            run(SCAN_PROJECT, json!({"project_path": "missing"})).await.unwrap_err(),
            NodeError::Upstream(_)
        ));
        assert!(matches!(
            run(SCAN_PROJECT, json!({"project_path": 3})).await.unwrap_err(),
            NodeError::InvalidInput(_)
        ));
    }
}
