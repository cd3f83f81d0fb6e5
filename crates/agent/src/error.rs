//! Errors raised by the agent layer.

use thiserror::Error;
use twin_core::ProviderError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The first model call of a turn failed; the turn is abandoned.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error("History file {path}: {reason}")]
    History { path: String, reason: String },
}

impl AgentError {
    pub(crate) fn history(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::History {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
