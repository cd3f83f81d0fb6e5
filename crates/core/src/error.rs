//! Error types for the twin domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all twin operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Filesystem ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Model server unavailable: {0}")]
    Unavailable(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Coarse classification of tool failures.
///
/// Carried on every failed `ToolResult` so the CLI and the follow-up prompt
/// can describe a failure without matching on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NoMatch,
    AmbiguousMatch,
    Timeout,
    Unavailable,
    PreconditionFailed,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::NoMatch => "no_match",
            Self::AmbiguousMatch => "ambiguous_match",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::PreconditionFailed => "precondition_failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("String not found in {path}: '{snippet}'")]
    NoMatch { path: String, snippet: String },

    #[error("String appears {count} times in {path}; provide more surrounding context")]
    AmbiguousMatch { path: String, count: usize },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Command failed with exit code {exit_code}")]
    CommandFailed { exit_code: i32, output: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

impl ToolError {
    /// Map this error onto the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NoMatch { .. } => ErrorKind::NoMatch,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::CommandFailed { .. }
            | Self::InvalidArguments(_)
            | Self::UnknownTool(_)
            | Self::ExecutionFailed { .. } => ErrorKind::Unknown,
        }
    }

    /// Output produced before the failure, if any (e.g. a command's stdout).
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(tool_name: &str, path: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(format!("File not found: {path}")),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                tool_name: tool_name.into(),
                reason: format!("{path}: {err}"),
            },
            _ => Self::ExecutionFailed {
                tool_name: tool_name.into(),
                reason: format!("{path}: {err}"),
            },
        }
    }
}
