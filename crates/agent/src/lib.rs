//! The conversational core of twin.
//!
//! Each user turn follows a **parse → execute → re-prompt** cycle:
//!
//! 1. **Send** the question, with the system prompt, to the model
//! 2. **Parse** tool calls out of the response
//! 3. **Execute** every call in order, each producing exactly one result
//! 4. **Re-prompt** the model with the question and those results only
//! 5. **Answer** with the follow-up text, tool markers stripped
//!
//! Around the loop sit the pieces a session needs: agent profiles, mode
//! detection, prompt construction and the per-directory history file.

pub mod agents;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod modes;
pub mod parser;
pub mod prompt;
pub mod session;

pub use agents::{AgentCatalog, AgentProfile, AgentSelection};
pub use dispatch::{DispatchEvent, DispatchState, Dispatcher, TurnOutcome};
pub use error::AgentError;
pub use history::{HistoryEntry, HistoryStore};
pub use modes::{Detection, ModeSource};
pub use parser::{parse_tool_calls, strip_tool_calls};
pub use session::{SessionContext, SessionMetrics};
