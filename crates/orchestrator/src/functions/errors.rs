use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while dispatching a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ToolError {
    /// No handler is registered under the name.
    #[error("function not registered: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }
}
