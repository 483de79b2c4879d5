//! Conversation data model and the model endpoint seam.

pub mod errors;
pub mod http;
pub mod types;

pub use errors::EndpointError;
pub use http::HttpModelEndpoint;
pub use types::{
    Arguments, FunctionCall, FunctionResult, GenerationConfig, ModelEndpoint, ModelRequest,
    ModelResponse, Part, Role, ToolOutcome, Turn, Usage,
};
