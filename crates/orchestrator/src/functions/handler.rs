//! Handler trait implemented by locally registered functions.

use super::ToolError;
use crate::model::FunctionCall;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// A side-effecting local function the model may invoke.
///
/// Handlers are neither sandboxed nor time-boxed by the registry.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, call: FunctionCall) -> Result<Value, ToolError>;
}

/// Adapter returned by [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F>(F);

/// Wrap an async closure as a [`FunctionHandler`].
///
/// ```
/// use orchestrator::{FunctionCall, ToolError, handler_fn};
/// use serde_json::json;
///
/// let echo = handler_fn(|call: FunctionCall| async move {
///     Ok::<_, ToolError>(json!(call.args))
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(FunctionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> FunctionHandler for FnHandler<F>
where
    F: Fn(FunctionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn call(&self, call: FunctionCall) -> Result<Value, ToolError> {
        (self.0)(call).await
    }
}
