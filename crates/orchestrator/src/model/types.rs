//! Conversation types shared by the loop, the history and the endpoints.

use super::errors::EndpointError;
use crate::functions::FunctionDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::ops::AddAssign;

pub use journal::Role;

/// Named arguments of a function call.
pub type Arguments = Map<String, Value>;

/// A model-issued request to invoke a local function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Correlates the call with its result. Empty until the loop assigns one
    /// when the endpoint did not.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Arguments,
}

impl FunctionCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of dispatching a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success { output: Value },
    Error { message: String },
}

impl ToolOutcome {
    pub fn success(output: Value) -> Self {
        Self::Success { output }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The value handed back to the model.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success { output } => output.clone(),
            Self::Error { message } => serde_json::json!({ "error": message }),
        }
    }

    /// Flatten to text, for endpoints that only accept string outputs.
    pub fn to_text(&self) -> String {
        match self {
            Self::Success {
                output: Value::String(s),
            } => s.clone(),
            Self::Success { output } => output.to_string(),
            Self::Error { message } => message.clone(),
        }
    }
}

/// The result written back for one function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub call_id: String,
    pub name: String,
    pub outcome: ToolOutcome,
}

/// A single unit of content inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        mime_type: String,
    },
    FunctionCall(FunctionCall),
    FunctionResult(FunctionResult),
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    pub fn image(data: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Whether this part may only enter the history through a call batch.
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, Self::FunctionCall(_) | Self::FunctionResult(_))
    }
}

/// One role-attributed unit of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn from_parts(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Assistant turn carrying a batch of calls.
    pub fn call_batch(calls: Vec<FunctionCall>) -> Self {
        Self::from_parts(
            Role::Assistant,
            calls.into_iter().map(Part::FunctionCall).collect(),
        )
    }

    /// Counterpart turn answering a call batch.
    pub fn result_batch(results: Vec<FunctionResult>) -> Self {
        Self::from_parts(
            Role::User,
            results.into_iter().map(Part::FunctionResult).collect(),
        )
    }

    /// Combined text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn function_results(&self) -> Vec<&FunctionResult> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// True when the turn holds nothing but function calls.
    pub fn is_call_bookkeeping(&self) -> bool {
        !self.parts.is_empty()
            && self
                .parts
                .iter()
                .all(|p| matches!(p, Part::FunctionCall(_)))
    }

    /// True when the turn holds nothing but function results.
    pub fn is_result_bookkeeping(&self) -> bool {
        !self.parts.is_empty()
            && self
                .parts
                .iter()
                .all(|p| matches!(p, Part::FunctionResult(_)))
    }
}

/// Sampling options forwarded to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Everything needed for one model round trip.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// Sent separately from the turns, never as one of them.
    pub system: Option<&'a str>,
    pub turns: &'a [Turn],
    pub generation: Option<&'a GenerationConfig>,
    pub functions: &'a [FunctionDescriptor],
}

/// The content block a model returned.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub turn: Turn,
    pub usage: Usage,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            turn: Turn::assistant(text),
            usage: Usage::default(),
        }
    }

    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            turn: Turn::call_batch(calls),
            usage: Usage::default(),
        }
    }
}

/// A conversational model that may answer with text or function calls.
pub trait ModelEndpoint: Send + Sync {
    fn generate(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, EndpointError>> + Send;
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
