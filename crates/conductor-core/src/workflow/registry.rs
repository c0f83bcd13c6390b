//! Node registry for runtime handler lookup.
//!
//! A name-indexed registry of boxed node handlers. Steps name a node type;
//! the engine resolves it here at dispatch time.

use std::collections::HashMap;

use conductor_types::error::NodeError;
use conductor_types::workflow::ValueMap;

use super::node::{BoxNodeHandler, NodeContext, NodeHandler};

/// Registry of available node handlers, indexed by node type.
///
/// Populated at startup, then shared read-only (behind an `Arc`) by every
/// running workflow. The registry applies no timeout; the engine does.
pub struct NodeRegistry {
    handlers: HashMap<String, BoxNodeHandler>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under the given node type.
    ///
    /// If a handler with this name already exists, it is replaced.
    pub fn register<H: NodeHandler + 'static>(&mut self, node_type: impl Into<String>, handler: H) {
        let node_type = node_type.into();
        if self
            .handlers
            .insert(node_type.clone(), BoxNodeHandler::new(handler))
            .is_some()
        {
            tracing::debug!(node_type = %node_type, "replaced node handler");
        }
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Run the handler registered for `node_type`.
    pub async fn execute(
        &self,
        node_type: &str,
        inputs: ValueMap,
        ctx: &NodeContext,
    ) -> Result<ValueMap, NodeError> {
        let handler = self
            .handlers
            .get(node_type)
            .ok_or_else(|| NodeError::UnknownNodeType(node_type.to_string()))?;
        handler.execute(inputs, ctx).await
    }

    /// Registered node types, sorted.
    pub fn available_nodes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.available_nodes())
            .finish()
    }
}
