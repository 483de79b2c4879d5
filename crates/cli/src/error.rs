//! CLI error types.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The journal file does not exist.
    ///
    /// This typically means no session has been started yet.
    #[error("journal not found at {path}. Run 'switchyard chat' first")]
    JournalNotFound { path: PathBuf },

    /// A drive ended in a state other than completed.
    #[error("run {run_id} ended {status}")]
    RunUnsuccessful { run_id: String, status: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] orchestrator::Error),

    #[error(transparent)]
    Journal(#[from] journal::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
