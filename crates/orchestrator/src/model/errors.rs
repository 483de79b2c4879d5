use thiserror::Error;

/// Errors raised by a model or job endpoint.
///
/// The orchestration core never retries these; they propagate to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EndpointError {
    /// The request never produced a response.
    #[error("network: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint api ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response body could not be understood.
    #[error("invalid endpoint response: {0}")]
    InvalidResponse(String),
}
