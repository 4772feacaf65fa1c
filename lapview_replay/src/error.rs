//! Error types for the replay harness.

use lapview_core::LoadError;
use thiserror::Error;

/// Errors surfaced by the replay harness and CLI.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ReplayError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}
