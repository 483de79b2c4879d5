//! Locally registered functions the model can call.

pub mod descriptor;
pub mod errors;
mod handler;
mod registry;

pub use descriptor::{FunctionDescriptor, ParamType, Parameter};
pub use errors::ToolError;
pub use handler::{FnHandler, FunctionHandler, handler_fn};
pub use registry::FunctionRegistry;
