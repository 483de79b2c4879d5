use crate::history::HistoryError;
use crate::model::EndpointError;
use thiserror::Error;

/// Errors surfaced by the orchestration core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport or decoding failure at an endpoint. Never retried here.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The model kept asking for calls past the configured round-trip limit.
    #[error("loop limit exceeded: model still requesting calls after {limit} round trips")]
    LoopLimitExceeded { limit: usize },

    #[error("history: {0}")]
    History(#[from] HistoryError),

    /// A run drive was cancelled before reaching a terminal state.
    #[error("run cancelled before reaching a terminal state")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Journal(#[from] journal::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
