//! [`ModelEndpoint`] over a JSON `generate` route.
//!
//! Request body:
//!
//! ```json
//! {
//!   "system_instruction": "be brief",
//!   "contents": [{"role": "user", "parts": [{"type": "text", "text": "hi"}]}],
//!   "generation_config": {"temperature": 0.2},
//!   "functions": [{"name": "get_weather", "description": "...", "parameters": {...}}]
//! }
//! ```
//!
//! Response body: `{"parts": [...], "usage": {"input_tokens": 3, "output_tokens": 5}}`.

use super::EndpointError;
use super::types::{
    GenerationConfig, ModelEndpoint, ModelRequest, ModelResponse, Part, Role, Turn, Usage,
};
use crate::http::{HttpClient, HttpConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const GENERATE_PATH: &str = "generate";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a str>,
    contents: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<FunctionDeclaration<'a>>,
}

#[derive(Serialize)]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default)]
    usage: Usage,
}

/// Talks to a model served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpModelEndpoint {
    http: HttpClient,
}

impl HttpModelEndpoint {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            http: HttpClient::new(config),
        }
    }

    /// Reuse an existing connection pool.
    pub fn with_client(client: reqwest::Client, config: HttpConfig) -> Self {
        Self {
            http: HttpClient::with_client(client, config),
        }
    }
}

impl std::fmt::Display for HttpModelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http({})", self.http.base_url())
    }
}

impl ModelEndpoint for HttpModelEndpoint {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, EndpointError> {
        let body = GenerateRequest {
            system_instruction: request.system,
            contents: request.turns,
            generation_config: request.generation,
            functions: request
                .functions
                .iter()
                .map(|f| FunctionDeclaration {
                    name: &f.name,
                    description: &f.description,
                    parameters: f.input_schema(),
                })
                .collect(),
        };

        let response: GenerateResponse = self.http.post(GENERATE_PATH, &body).await?;
        if response.parts.is_empty() {
            return Err(EndpointError::InvalidResponse(
                "response carried no content parts".into(),
            ));
        }

        Ok(ModelResponse {
            turn: Turn::from_parts(Role::Assistant, response.parts),
            usage: response.usage,
        })
    }
}
