//! Per-session state: identity, mode, agent, model, turn log and metrics.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use twin_core::{ConversationTurn, Mode};

/// Counters for one interactive session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    /// Turns sent to the model
    pub queries: u64,
    /// Time spent waiting on the model, across all calls
    pub model_time: Duration,
    pub tool_calls: u64,
    pub tool_failures: u64,
}

impl SessionMetrics {
    fn record(&mut self, turn: &ConversationTurn, model_time: Duration) {
        self.queries += 1;
        self.model_time += model_time;
        self.tool_calls += turn.tool_results.len() as u64;
        self.tool_failures += turn.failed_tools() as u64;
    }
}

/// Everything that belongs to one interactive session.
///
/// Passed explicitly into the dispatch loop; nothing here is global.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: String,
    mode: Mode,
    agent: String,
    model: String,
    turns: Vec<ConversationTurn>,
    /// Turns already written to the history file
    saved: usize,
    metrics: SessionMetrics,
    started_at: DateTime<Local>,
}

impl SessionContext {
    pub fn new(mode: Mode, agent: impl Into<String>, model: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            mode,
            agent: agent.into(),
            model: model.into(),
            turns: Vec::new(),
            saved: 0,
            metrics: SessionMetrics::default(),
            started_at: Local::now(),
        }
    }

    /// Eight lowercase hex characters.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn set_agent(&mut self, agent: impl Into<String>) {
        self.agent = agent.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch model, resolving `name` through the alias table.
    pub fn set_model(&mut self, name: &str, aliases: &BTreeMap<String, String>) -> &str {
        self.model = twin_providers::resolve_model(name, aliases);
        &self.model
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn record(&mut self, turn: ConversationTurn, model_time: Duration) {
        self.metrics.record(&turn, model_time);
        self.turns.push(turn);
    }

    /// Turns not yet persisted to history.
    pub fn unsaved_turns(&self) -> &[ConversationTurn] {
        &self.turns[self.saved..]
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.turns.len();
    }

    /// A plain-text recap of the discussion, capped at `max_chars`.
    pub fn planning_summary(&self, max_chars: usize) -> String {
        let discussion: String = self
            .turns
            .iter()
            .map(|t| format!("User: {}\nAssistant: {}\n", t.user_input, t.final_answer))
            .collect::<Vec<_>>()
            .join("\n");
        let discussion: String = discussion.chars().take(max_chars).collect();
        format!(
            "Planning Session Summary:\n- Agent: {}\n- Mode: {}\n- Model: {}\n- Session ID: {}\n\nDiscussion:\n{}\n",
            self.agent, self.mode, self.model, self.id, discussion
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_core::error::ToolError;
    use twin_core::tool::{ToolCall, ToolOutput, ToolResult};

    fn turn(input: &str, answer: &str, results: Vec<ToolResult>) -> ConversationTurn {
        ConversationTurn {
            user_input: input.into(),
            model_response: answer.into(),
            tool_results: results,
            final_answer: answer.into(),
            elapsed: Duration::from_millis(10),
            started_at: Local::now(),
        }
    }

    #[test]
    fn id_is_eight_hex_chars() {
        let session = SessionContext::new(Mode::Work, "assistant", "qwen2.5-coder:7b");
        assert_eq!(session.id().len(), 8);
        assert!(session.id().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(session.id(), SessionContext::new(Mode::Work, "a", "m").id());
    }

    #[test]
    fn metrics_accumulate() {
        let mut session = SessionContext::new(Mode::Personal, "assistant", "m");
        let ok = ToolResult::succeeded(ToolCall::new("read", Default::default()), ToolOutput::text("x"));
        let bad = ToolResult::failed(
            ToolCall::new("nope", Default::default()),
            &ToolError::UnknownTool("nope".into()),
        );
        session.record(turn("q1", "a1", vec![ok, bad]), Duration::from_secs(2));
        session.record(turn("q2", "a2", vec![]), Duration::from_secs(1));

        let m = session.metrics();
        assert_eq!(m.queries, 2);
        assert_eq!(m.tool_calls, 2);
        assert_eq!(m.tool_failures, 1);
        assert_eq!(m.model_time, Duration::from_secs(3));
    }

    #[test]
    fn unsaved_turns_tracked() {
        let mut session = SessionContext::new(Mode::Personal, "assistant", "m");
        session.record(turn("q1", "a1", vec![]), Duration::ZERO);
        assert_eq!(session.unsaved_turns().len(), 1);
        session.mark_saved();
        assert!(session.unsaved_turns().is_empty());
        session.record(turn("q2", "a2", vec![]), Duration::ZERO);
        assert_eq!(session.unsaved_turns()[0].user_input, "q2");
    }

    #[test]
    fn model_aliases_resolve() {
        let mut session = SessionContext::new(Mode::Personal, "assistant", "m");
        let aliases = BTreeMap::from([("smart".to_string(), "qwen2.5-coder:32b".to_string())]);
        assert_eq!(session.set_model("smart", &aliases), "qwen2.5-coder:32b");
        assert_eq!(session.set_model("llama3", &aliases), "llama3");
    }

    #[test]
    fn summary_is_capped() {
        let mut session = SessionContext::new(Mode::Work, "technical-lead", "m");
        session.record(turn(&"x".repeat(50), "ok", vec![]), Duration::ZERO);
        let summary = session.planning_summary(20);
        assert!(summary.contains("- Agent: technical-lead"));
        assert!(summary.contains("- Mode: work"));
        assert!(!summary.contains(&"x".repeat(20)));
    }
}
