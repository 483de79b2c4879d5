//! Name to handler bindings.

use super::{FunctionDescriptor, FunctionHandler, ToolError};
use crate::model::FunctionCall;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Registered functions, in registration order.
///
/// Cloning is cheap: handlers are shared, so one registry can serve a chat
/// session and a run driver.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    descriptors: Vec<FunctionDescriptor>,
    handlers: Vec<Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `descriptor.name`, replacing any existing binding.
    ///
    /// A replaced function moves to the end of the advertised list.
    pub fn register(
        &mut self,
        descriptor: FunctionDescriptor,
        handler: impl FunctionHandler + 'static,
    ) -> &mut Self {
        if self.unregister(&descriptor.name) {
            debug!(function = %descriptor.name, "replacing registered function");
        }
        self.descriptors.push(descriptor);
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Consuming form of [`register`](Self::register) for builder chains.
    pub fn with_function(
        mut self,
        descriptor: FunctionDescriptor,
        handler: impl FunctionHandler + 'static,
    ) -> Self {
        self.register(descriptor, handler);
        self
    }

    /// Remove a binding. Returns whether one existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.descriptors.remove(index);
                self.handlers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every binding.
    pub fn clear(&mut self) {
        self.descriptors.clear();
        self.handlers.clear();
    }

    pub fn descriptors(&self) -> &[FunctionDescriptor] {
        &self.descriptors
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    /// Look up the handler bound to `call.name` and invoke it.
    ///
    /// A panicking handler yields [`ToolError::Execution`].
    pub async fn dispatch(&self, call: &FunctionCall) -> Result<Value, ToolError> {
        let Some(index) = self.position(&call.name) else {
            warn!(function = %call.name, call_id = %call.id, "function not registered");
            return Err(ToolError::NotFound(call.name.clone()));
        };
        self.descriptors[index].check_arguments(&call.args)?;

        let handler = Arc::clone(&self.handlers[index]);
        debug!(function = %call.name, call_id = %call.id, "dispatching");
        AssertUnwindSafe(handler.call(call.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                warn!(function = %call.name, call_id = %call.id, "handler panicked");
                Err(ToolError::execution("handler panicked"))
            })
    }

    /// Dispatch with a caller-chosen time limit.
    pub async fn dispatch_with_timeout(
        &self,
        call: &FunctionCall,
        timeout: Duration,
    ) -> Result<Value, ToolError> {
        tokio::time::timeout(timeout, self.dispatch(call))
            .await
            .map_err(|_| ToolError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)))?
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.descriptors.iter().map(|d| &d.name))
            .finish()
    }
}
