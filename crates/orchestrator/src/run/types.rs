//! Server-side runs and the job endpoint seam.

use crate::functions::{FunctionDescriptor, ToolError};
use crate::model::{Arguments, EndpointError, FunctionCall};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// A call a run is waiting on. Arguments arrive as raw JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub raw_arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        function_name: impl Into<String>,
        raw_arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }

    /// Parse the raw arguments. Blank text means no arguments.
    pub fn arguments(&self) -> Result<Arguments, ToolError> {
        if self.raw_arguments.trim().is_empty() {
            return Ok(Arguments::new());
        }
        match serde_json::from_str::<Value>(&self.raw_arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
        }
    }

    pub fn to_function_call(&self) -> Result<FunctionCall, ToolError> {
        Ok(FunctionCall::new(
            self.id.clone(),
            self.function_name.clone(),
            self.arguments()?,
        ))
    }
}

/// Why a run failed, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Where a run stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    /// The run is blocked until outputs for these calls are submitted.
    RequiresAction(Vec<ToolCall>),
    /// Cancellation requested server-side but not yet finished.
    Cancelling,
    Completed(Option<String>),
    Failed(RunFailure),
    Cancelled,
    Expired,
}

impl RunState {
    /// Build a state from its wire status. Returns `None` for unknown statuses.
    pub fn from_status(
        status: &str,
        tool_calls: Vec<ToolCall>,
        failure: Option<RunFailure>,
        output: Option<String>,
    ) -> Option<Self> {
        let state = match status {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "requires_action" => Self::RequiresAction(tool_calls),
            "cancelling" => Self::Cancelling,
            "completed" => Self::Completed(output),
            "failed" => Self::Failed(failure.unwrap_or_else(|| RunFailure {
                code: "unknown".into(),
                message: "run failed without an error report".into(),
            })),
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            _ => return None,
        };
        Some(state)
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction(_) => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Whether the run will never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed(_) | Self::Failed(_) | Self::Cancelled | Self::Expired
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status())
    }
}

/// Token accounting reported for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A run as last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: Option<String>,
    pub state: RunState,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub created_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub usage: Option<RunUsage>,
}

impl RunSnapshot {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>, state: RunState) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            assistant_id: None,
            state,
            model: None,
            instructions: None,
            created_at: None,
            completed_at: None,
            usage: None,
        }
    }
}

/// Parameters for starting a run on a thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    pub thread_id: String,
    pub assistant_id: String,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub additional_instructions: Option<String>,
    /// Functions advertised to the run, typically a registry's descriptors.
    pub functions: Vec<FunctionDescriptor>,
}

impl RunRequest {
    pub fn new(thread_id: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            ..Self::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }

    pub fn functions(mut self, functions: impl Into<Vec<FunctionDescriptor>>) -> Self {
        self.functions = functions.into();
        self
    }
}

/// The output submitted for one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// A server that executes runs and pauses them for local function calls.
pub trait JobEndpoint: Send + Sync {
    fn create_run(
        &self,
        request: &RunRequest,
    ) -> impl Future<Output = Result<RunSnapshot, EndpointError>> + Send;

    fn get_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> impl Future<Output = Result<RunSnapshot, EndpointError>> + Send;

    /// Submit outputs for a run in `requires_action`. Returns the run as
    /// it stands after the submission.
    fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> impl Future<Output = Result<RunSnapshot, EndpointError>> + Send;
}
