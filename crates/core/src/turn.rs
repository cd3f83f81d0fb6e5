//! One conversational turn as recorded in the session log.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::tool::ToolResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// What the user typed
    pub user_input: String,

    /// The model's first response, before any tool execution
    pub model_response: String,

    /// Results of every tool call in that response, in call order
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,

    /// The text shown to the user (the follow-up answer when tools ran)
    pub final_answer: String,

    /// Time spent on the whole turn
    pub elapsed: Duration,

    pub started_at: DateTime<Local>,
}

impl ConversationTurn {
    pub fn used_tools(&self) -> bool {
        !self.tool_results.is_empty()
    }

    pub fn failed_tools(&self) -> usize {
        self.tool_results.iter().filter(|r| !r.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tool::{ToolCall, ToolOutput};

    #[test]
    fn counts_failures() {
        let ok = ToolResult::succeeded(
            ToolCall::new("read", serde_json::Map::new()),
            ToolOutput::text("1\thi"),
        );
        let bad = ToolResult::failed(
            ToolCall::new("bash", serde_json::Map::new()),
            &ToolError::CommandFailed { exit_code: 1, output: String::new() },
        );
        let turn = ConversationTurn {
            user_input: "q".into(),
            model_response: "r".into(),
            tool_results: vec![ok, bad],
            final_answer: "a".into(),
            elapsed: Duration::from_millis(5),
            started_at: Local::now(),
        };
        assert!(turn.used_tools());
        assert_eq!(turn.failed_tools(), 1);
    }
}
