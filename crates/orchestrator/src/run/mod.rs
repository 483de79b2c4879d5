//! Asynchronous, server-hosted runs.

mod driver;
pub mod http;
mod types;

pub use driver::{DEFAULT_POLL_INTERVAL_MS, PollConfig, RunDriver};
pub use http::HttpJobEndpoint;
pub use types::{
    JobEndpoint, RunFailure, RunRequest, RunSnapshot, RunState, RunUsage, ToolCall, ToolOutput,
};
