//! [`JobEndpoint`] over an assistants-style threads/runs API.

use super::types::{
    JobEndpoint, RunFailure, RunRequest, RunSnapshot, RunState, RunUsage, ToolCall, ToolOutput,
};
use crate::http::{HttpClient, HttpConfig};
use crate::model::EndpointError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Serialize)]
struct CreateRunBody<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    tool_outputs: &'a [ToolOutput],
}

#[derive(Deserialize)]
struct RunPayload {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    assistant_id: Option<String>,
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunFailure>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    completed_at: Option<i64>,
    #[serde(default)]
    usage: Option<RunUsage>,
}

#[derive(Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Deserialize)]
struct SubmitToolOutputs {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl RunPayload {
    fn into_snapshot(self, thread_id: &str) -> Result<RunSnapshot, EndpointError> {
        let tool_calls = self
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
                    .collect()
            })
            .unwrap_or_default();

        let state = RunState::from_status(&self.status, tool_calls, self.last_error, self.output)
            .ok_or_else(|| {
                EndpointError::InvalidResponse(format!("unknown run status '{}'", self.status))
            })?;

        Ok(RunSnapshot {
            id: self.id,
            thread_id: self.thread_id.unwrap_or_else(|| thread_id.to_string()),
            assistant_id: self.assistant_id,
            state,
            model: self.model,
            instructions: self.instructions,
            created_at: self.created_at,
            completed_at: self.completed_at,
            usage: self.usage,
        })
    }
}

/// Runs hosted behind an HTTP API.
#[derive(Debug, Clone)]
pub struct HttpJobEndpoint {
    http: HttpClient,
}

impl HttpJobEndpoint {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            http: HttpClient::new(config),
        }
    }

    pub fn with_client(client: reqwest::Client, config: HttpConfig) -> Self {
        Self {
            http: HttpClient::with_client(client, config),
        }
    }
}

impl std::fmt::Display for HttpJobEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http-jobs({})", self.http.base_url())
    }
}

impl JobEndpoint for HttpJobEndpoint {
    async fn create_run(&self, request: &RunRequest) -> Result<RunSnapshot, EndpointError> {
        let body = CreateRunBody {
            assistant_id: &request.assistant_id,
            model: request.model.as_deref(),
            instructions: request.instructions.as_deref(),
            additional_instructions: request.additional_instructions.as_deref(),
            tools: request
                .functions
                .iter()
                .map(|f| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": f.name,
                            "description": f.description,
                            "parameters": f.input_schema(),
                        }
                    })
                })
                .collect(),
        };
        let path = format!("threads/{}/runs", request.thread_id);
        let payload: RunPayload = self.http.post(&path, &body).await?;
        payload.into_snapshot(&request.thread_id)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunSnapshot, EndpointError> {
        let path = format!("threads/{thread_id}/runs/{run_id}");
        let payload: RunPayload = self.http.get(&path).await?;
        payload.into_snapshot(thread_id)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<RunSnapshot, EndpointError> {
        let path = format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs");
        let body = SubmitBody {
            tool_outputs: outputs,
        };
        let payload: RunPayload = self.http.post(&path, &body).await?;
        payload.into_snapshot(thread_id)
    }
}
