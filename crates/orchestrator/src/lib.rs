//! Switchyard orchestrator: function calling between models and local code.
//!
//! Two ways of letting a model call registered functions are provided:
//!
//! - **ToolLoop**: synchronous round trips with a conversational model. Call
//!   batches run concurrently and their results go back in issue order until
//!   the model answers in text.
//! - **RunDriver**: a server-hosted run is polled until it finishes; whenever
//!   it stops in `requires_action`, the requested calls are dispatched and
//!   their outputs submitted in one batch.
//!
//! Both share a [`FunctionRegistry`], and both can journal what they do to a
//! [`journal::EventStore`] through a [`Recorder`].
//!
//! # Example
//!
//! ```no_run
//! use orchestrator::{
//!     FunctionCall, FunctionDescriptor, FunctionRegistry, HttpConfig, HttpModelEndpoint,
//!     ParamType, Parameter, Session, ToolError, handler_fn,
//! };
//! use serde_json::json;
//!
//! # async fn example() -> orchestrator::Result<()> {
//! let registry = FunctionRegistry::new().with_function(
//!     FunctionDescriptor::new("get_weather", "Current temperature for a city")
//!         .param(Parameter::new("city", ParamType::String).required()),
//!     handler_fn(|call: FunctionCall| async move {
//!         Ok::<_, ToolError>(json!({ "city": call.args["city"], "celsius": 18 }))
//!     }),
//! );
//!
//! let endpoint = HttpModelEndpoint::new(HttpConfig::new("http://localhost:8080/v1"));
//! let mut session = Session::new(endpoint, registry).with_system("You are a weather bot.");
//! let answer = session.chat("What's the weather in Paris?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod functions;
pub mod history;
mod http;
pub mod model;
pub mod pending;
mod recorder;
pub mod run;
mod session;
pub mod tool_loop;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use functions::{
    FnHandler, FunctionDescriptor, FunctionHandler, FunctionRegistry, ParamType, Parameter,
    ToolError, handler_fn,
};
pub use history::{History, HistoryError, Snapshot};
pub use http::HttpConfig;
pub use model::{
    Arguments, EndpointError, FunctionCall, FunctionResult, GenerationConfig, HttpModelEndpoint,
    ModelEndpoint, ModelRequest, ModelResponse, Part, Role, ToolOutcome, Turn, Usage,
};
pub use pending::{PendingBatch, PendingCall};
pub use recorder::Recorder;
pub use run::{
    HttpJobEndpoint, JobEndpoint, PollConfig, RunDriver, RunFailure, RunRequest, RunSnapshot,
    RunState, RunUsage, ToolCall, ToolOutput,
};
pub use session::Session;
pub use tool_loop::{Compaction, LoopConfig, LoopOutcome, ToolLoop};
