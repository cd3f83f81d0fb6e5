//! # twin core
//!
//! Domain types, traits, and error definitions for the twin local-LLM
//! assistant. This crate has no I/O of its own: it defines the model that
//! the provider, tool and agent crates implement against.
//!
//! ## Layout
//!
//! - [`tool`]: the `Tool` trait, tool calls/results and the registry that
//!   turns every call into exactly one result
//! - [`provider`]: the `Provider` trait over a local text-completion server
//! - [`turn`]: one conversational turn as recorded in the session log
//! - [`mode`]: work / personal operating mode
//! - [`error`]: error enums per bounded context

pub mod error;
pub mod mode;
pub mod provider;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ErrorKind, ProviderError, Result, ToolError};
pub use mode::Mode;
pub use provider::{Completion, CompletionRequest, Provider};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolOutput, ToolRegistry, ToolResult};
pub use turn::ConversationTurn;
