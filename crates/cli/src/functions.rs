//! Built-in demo functions offered to the model in `chat`.

use chrono::{Local, Utc};
use orchestrator::{
    FunctionCall, FunctionDescriptor, FunctionRegistry, ParamType, Parameter, ToolError,
    handler_fn,
};
use serde_json::json;

pub fn builtin_registry() -> FunctionRegistry {
    FunctionRegistry::new()
        .with_function(
            FunctionDescriptor::new("current_time", "Current date and time").param(
                Parameter::new("timezone", ParamType::String)
                    .describe("Which clock to read")
                    .one_of(["utc", "local"]),
            ),
            handler_fn(|call: FunctionCall| async move {
                let now = match call.args.get("timezone").and_then(|v| v.as_str()) {
                    Some("local") => Local::now().to_rfc3339(),
                    _ => Utc::now().to_rfc3339(),
                };
                Ok::<_, ToolError>(json!(now))
            }),
        )
        .with_function(
            FunctionDescriptor::new("word_count", "Count words and characters in a text").param(
                Parameter::new("text", ParamType::String)
                    .describe("Text to measure")
                    .required(),
            ),
            handler_fn(|call: FunctionCall| async move {
                let text = call
                    .args
                    .get("text")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ToolError::InvalidArguments("'text' must be a string".into()))?;
                Ok::<_, ToolError>(json!({
                    "words": text.split_whitespace().count(),
                    "characters": text.chars().count(),
                }))
            }),
        )
}
