//! Node handler trait and its object-safe wrapper.
//!
//! Follows the same blanket-impl pattern used for every RPITIT trait that
//! needs runtime dispatch:
//! 1. Define an object-safe `NodeHandlerDyn` trait with boxed futures
//! 2. Blanket-impl `NodeHandlerDyn` for all `T: NodeHandler`
//! 3. `BoxNodeHandler` wraps `Box<dyn NodeHandlerDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use conductor_types::error::NodeError;
use conductor_types::workflow::{StepId, ValueMap, WorkflowId};

/// What a handler can see of the run it executes in.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub workflow_id: WorkflowId,
    pub step_id: StepId,
    /// Read-only snapshot of the run context at dispatch time.
    pub context: ValueMap,
}

impl NodeContext {
    pub fn new(workflow_id: WorkflowId, step_id: StepId, context: ValueMap) -> Self {
        Self {
            workflow_id,
            step_id,
            context,
        }
    }
}

/// A unit of work a workflow step can invoke by node type.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods.
pub trait NodeHandler: Send + Sync {
    fn execute(
        &self,
        inputs: ValueMap,
        ctx: &NodeContext,
    ) -> impl Future<Output = Result<ValueMap, NodeError>> + Send;
}

/// Object-safe version of [`NodeHandler`] with boxed futures.
pub trait NodeHandlerDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        inputs: ValueMap,
        ctx: &'a NodeContext,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, NodeError>> + Send + 'a>>;
}

impl<T: NodeHandler> NodeHandlerDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        inputs: ValueMap,
        ctx: &'a NodeContext,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap, NodeError>> + Send + 'a>> {
        Box::pin(self.execute(inputs, ctx))
    }
}

/// Type-erased node handler stored in the registry.
pub struct BoxNodeHandler {
    inner: Box<dyn NodeHandlerDyn + Send + Sync>,
}

impl BoxNodeHandler {
    pub fn new<T: NodeHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Box::new(handler),
        }
    }

    pub async fn execute(&self, inputs: ValueMap, ctx: &NodeContext) -> Result<ValueMap, NodeError> {
        self.inner.execute_boxed(inputs, ctx).await
    }
}

/// Adapter turning an async closure into a [`NodeHandler`].
///
/// Handy for tests and one-off nodes that need no state.
pub struct FnNode<F>(pub F);

impl<F, Fut> NodeHandler for FnNode<F>
where
    F: Fn(ValueMap, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ValueMap, NodeError>> + Send,
{
    fn execute(
        &self,
        inputs: ValueMap,
        ctx: &NodeContext,
    ) -> impl Future<Output = Result<ValueMap, NodeError>> + Send {
        (self.0)(inputs, ctx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl NodeHandler for Echo {
        async fn execute(&self, inputs: ValueMap, ctx: &NodeContext) -> Result<ValueMap, NodeError> {
            let mut out = inputs;
            out.insert("step".to_string(), json!(ctx.step_id.as_str()));
            Ok(out)
        }
    }

    fn ctx() -> NodeContext {
        NodeContext::new(WorkflowId::new(), StepId::from("s1"), ValueMap::new())
    }

    #[tokio::test]
    async fn boxed_handler_delegates() {
        let handler = BoxNodeHandler::new(Echo);
        let mut inputs = ValueMap::new();
        inputs.insert("a".to_string(), json!(1));
        let out = handler.execute(inputs, &ctx()).await.unwrap();
        assert_eq!(out["a"], 1);
        assert_eq!(out["step"], "s1");
    }

    #[tokio::test]
    async fn fn_node_adapter() {
        let handler = BoxNodeHandler::new(FnNode(|_inputs: ValueMap, _ctx: NodeContext| async {
            Err::<ValueMap, _>(NodeError::Execution("nope".into()))
        }));
        let err = handler.execute(ValueMap::new(), &ctx()).await.unwrap_err();
        assert_eq!(err, NodeError::Execution("nope".into()));
    }
}
