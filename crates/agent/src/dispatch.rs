//! The tool-call dispatch loop.
//!
//! One turn runs through a fixed sequence of states:
//!
//! 1. **Idle**: waiting for the model's first response
//! 2. **Parsing**: tool calls are extracted from the response
//! 3. **Executing(i)**: call `i` runs to a result, whatever its outcome
//! 4. **Reprompting**: the question and this turn's results go back to the
//!    model, with no system prompt
//! 5. **Done**
//!
//! A response without tool calls goes straight from Parsing to Done. There
//! are no retries and no iteration cap; once the first model call succeeds
//! the turn always completes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use twin_core::provider::{CompletionRequest, Provider};
use twin_core::tool::{ToolRegistry, ToolResult};
use twin_core::{ConversationTurn, ProviderError};

use crate::error::AgentError;
use crate::parser::{parse_tool_calls, strip_tool_calls};
use crate::prompt::{follow_up_prompt, format_tool_results};
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Parsing,
    Executing { index: usize },
    Reprompting,
    Done,
}

/// Progress events emitted while a turn runs.
///
/// - `state`: the loop moved to a new state
/// - `tool_started`: a call is about to execute
/// - `tool_finished`: a call produced its result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    State { state: DispatchState },

    ToolStarted {
        index: usize,
        total: usize,
        name: String,
        arguments: String,
    },

    ToolFinished {
        index: usize,
        name: String,
        success: bool,
        error: Option<String>,
    },
}

impl DispatchEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
        }
    }
}

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn: ConversationTurn,
    /// Set when tools ran but the follow-up model call failed. The final
    /// answer then holds the rendered tool results and a notice.
    pub reprompt_error: Option<ProviderError>,
}

/// Runs turns against one provider and tool registry.
pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    temperature: f32,
    num_ctx: Option<u32>,
    events: Option<mpsc::UnboundedSender<DispatchEvent>>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            system_prompt: String::new(),
            temperature: 0.7,
            num_ctx: None,
            events: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_num_ctx(mut self, num_ctx: Option<u32>) -> Self {
        self.num_ctx = num_ctx;
        self
    }

    /// Report progress on `sender`. A dropped receiver is ignored.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Replace the system prompt, e.g. after a mode or agent switch.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(sender) = &self.events
            && let Err(unsent) = sender.send(event)
        {
            debug!(event = unsent.0.event_type(), "No listener for dispatch event");
        }
    }

    fn enter(&self, state: DispatchState) {
        debug!(?state, "Dispatch state");
        self.emit(DispatchEvent::State { state });
    }

    fn request(&self, model: &str, prompt: &str) -> CompletionRequest {
        CompletionRequest::new(model, prompt)
            .with_temperature(self.temperature)
            .with_num_ctx(self.num_ctx)
    }

    /// Run one turn and record it in `session`.
    ///
    /// Fails only when the first model call fails; tool failures and a
    /// failed follow-up call are part of the outcome.
    pub async fn run_turn(
        &self,
        session: &mut SessionContext,
        user_input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let started = Instant::now();
        let started_at = Local::now();
        let model = session.model().to_string();
        info!(session = %session.id(), model = %model, "Turn started");
        self.enter(DispatchState::Idle);

        let mut request = self.request(&model, user_input);
        if !self.system_prompt.is_empty() {
            request = request.with_system(self.system_prompt.clone());
        }
        let first = self.provider.complete(request).await?;
        let mut model_time = first.elapsed;

        self.enter(DispatchState::Parsing);
        let calls = parse_tool_calls(&first.text);

        let mut results: Vec<ToolResult> = Vec::with_capacity(calls.len());
        let mut reprompt_error = None;
        let final_answer = if calls.is_empty() {
            first.text.trim().to_string()
        } else {
            let total = calls.len();
            for (index, call) in calls.iter().enumerate() {
                self.enter(DispatchState::Executing { index });
                self.emit(DispatchEvent::ToolStarted {
                    index,
                    total,
                    name: call.name.clone(),
                    arguments: call.display_arguments(),
                });
                let result = self.tools.dispatch(call).await;
                self.emit(DispatchEvent::ToolFinished {
                    index,
                    name: call.name.clone(),
                    success: result.success,
                    error: result.error.clone(),
                });
                results.push(result);
            }

            self.enter(DispatchState::Reprompting);
            let follow_up = self.request(&model, &follow_up_prompt(user_input, &results));
            match self.provider.complete(follow_up).await {
                Ok(completion) => {
                    model_time += completion.elapsed;
                    strip_tool_calls(&completion.text)
                }
                Err(e) => {
                    warn!("Follow-up model call failed: {e}");
                    let answer = format!(
                        "{}\n\n[The model could not be reached to interpret these results: {e}]",
                        format_tool_results(&results)
                    );
                    reprompt_error = Some(e);
                    answer
                }
            }
        };
        self.enter(DispatchState::Done);

        let turn = ConversationTurn {
            user_input: user_input.to_string(),
            model_response: first.text,
            tool_results: results,
            final_answer,
            elapsed: started.elapsed(),
            started_at,
        };
        info!(
            session = %session.id(),
            tool_calls = turn.tool_results.len(),
            failures = turn.failed_tools(),
            elapsed_ms = duration_ms(turn.elapsed),
            "Turn finished"
        );
        session.record(turn.clone(), model_time);
        Ok(TurnOutcome { turn, reprompt_error })
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}


#[cfg(test)]
mod tests {
    use super::test_helpers::ScriptedProvider;
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use twin_core::error::ToolError;
    use twin_core::tool::{Tool, ToolOutput};
    use twin_core::Mode;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text argument"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
            match arguments.get("text").and_then(Value::as_str) {
                Some(text) => Ok(ToolOutput::text(text)),
                None => Err(ToolError::InvalidArguments("missing 'text'".into())),
            }
        }
    }

    fn setup(responses: Vec<Result<String, ProviderError>>) -> (Arc<ScriptedProvider>, Dispatcher) {
        let provider = Arc::new(ScriptedProvider::new(responses));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let dispatcher = Dispatcher::new(provider.clone(), Arc::new(registry))
            .with_system_prompt("SYSTEM");
        (provider, dispatcher)
    }

    fn session() -> SessionContext {
        SessionContext::new(Mode::Personal, "assistant", "test-model")
    }

    #[tokio::test]
    async fn plain_answer_skips_tools() {
        let (provider, dispatcher) = setup(vec![Ok("Just an answer.".into())]);
        let mut session = session();
        let outcome = dispatcher.run_turn(&mut session, "hi").await.unwrap();
        assert_eq!(outcome.turn.final_answer, "Just an answer.");
        assert!(!outcome.turn.used_tools());
        assert_eq!(provider.requests().len(), 1);
        assert_eq!(provider.requests()[0].system.as_deref(), Some("SYSTEM"));
        assert_eq!(session.metrics().queries, 1);
    }

    #[tokio::test]
    async fn tool_results_feed_follow_up_without_system_prompt() {
        let (provider, dispatcher) = setup(vec![
            Ok("TOOL_CALL: echo\nARGS: {\"text\": \"pong\"}".into()),
            Ok("The tool said pong.".into()),
        ]);
        let mut session = session();
        let outcome = dispatcher.run_turn(&mut session, "ping?").await.unwrap();

        assert_eq!(outcome.turn.tool_results.len(), 1);
        assert!(outcome.turn.tool_results[0].success);
        assert_eq!(outcome.turn.final_answer, "The tool said pong.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].system.is_none());
        assert!(requests[1].prompt.contains("Original question: ping?"));
        assert!(requests[1].prompt.contains("TOOL_RESULT: success\nTOOL: echo\nOUTPUT: pong"));
        assert_eq!(requests[1].model, "test-model");
    }

    #[tokio::test]
    async fn every_call_gets_one_result() {
        let (_, dispatcher) = setup(vec![
            Ok(concat!(
                "TOOL_CALL: echo\nARGS: {\"text\": \"a\"}\n",
                "TOOL_CALL: nope\nARGS: {}\n",
                "TOOL_CALL: echo\nARGS: broken\n",
                "TOOL_CALL: echo\nARGS: {\"text\": \"b\"}\n",
            )
            .into()),
            Ok("ok".into()),
        ]);
        let mut session = session();
        let outcome = dispatcher.run_turn(&mut session, "q").await.unwrap();
        let results = &outcome.turn.tool_results;
        assert_eq!(results.len(), 4);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error.as_deref(), Some("Unknown tool: nope"));
        assert!(!results[2].success);
        assert!(results[2].error.as_deref().unwrap().contains("could not parse arguments"));
        assert_eq!(results[3].output, "b");
        assert_eq!(session.metrics().tool_failures, 2);
    }

    #[tokio::test]
    async fn first_call_failure_abandons_turn() {
        let (_, dispatcher) = setup(vec![Err(ProviderError::Unavailable("down".into()))]);
        let mut session = session();
        let err = dispatcher.run_turn(&mut session, "q").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Unavailable(_))));
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn follow_up_failure_still_completes() {
        let (_, dispatcher) = setup(vec![
            Ok("TOOL_CALL: echo\nARGS: {\"text\": \"pong\"}".into()),
            Err(ProviderError::Timeout("120s".into())),
        ]);
        let mut session = session();
        let outcome = dispatcher.run_turn(&mut session, "q").await.unwrap();
        assert!(matches!(outcome.reprompt_error, Some(ProviderError::Timeout(_))));
        assert!(outcome.turn.final_answer.starts_with("TOOL_RESULT: success\nTOOL: echo\nOUTPUT: pong"));
        assert!(outcome.turn.final_answer.contains("could not be reached"));
        assert_eq!(session.turns().len(), 1);
    }

    #[tokio::test]
    async fn tool_calls_in_follow_up_are_stripped_not_run() {
        let (provider, dispatcher) = setup(vec![
            Ok("TOOL_CALL: echo\nARGS: {\"text\": \"1\"}".into()),
            Ok("Done.\nTOOL_CALL: echo\nARGS: {\"text\": \"2\"}".into()),
        ]);
        let mut session = session();
        let outcome = dispatcher.run_turn(&mut session, "q").await.unwrap();
        assert_eq!(outcome.turn.final_answer, "Done.");
        assert_eq!(outcome.turn.tool_results.len(), 1);
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn events_trace_the_state_machine() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_, dispatcher) = setup(vec![
            Ok("TOOL_CALL: echo\nARGS: {\"text\": \"x\"}\nTOOL_CALL: nope\nARGS: {}".into()),
            Ok("fin".into()),
        ]);
        let dispatcher = dispatcher.with_events(tx);
        let mut session = session();
        dispatcher.run_turn(&mut session, "q").await.unwrap();
        drop(dispatcher);

        let mut states = Vec::new();
        let mut finished = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                DispatchEvent::State { state } => states.push(state),
                DispatchEvent::ToolFinished { name, success, .. } => finished.push((name, success)),
                DispatchEvent::ToolStarted { .. } => {}
            }
        }
        assert_eq!(
            states,
            vec![
                DispatchState::Idle,
                DispatchState::Parsing,
                DispatchState::Executing { index: 0 },
                DispatchState::Executing { index: 1 },
                DispatchState::Reprompting,
                DispatchState::Done,
            ]
        );
        assert_eq!(finished, vec![("echo".to_string(), true), ("nope".to_string(), false)]);
    }

    #[test]
    fn event_serialization() {
        let event = DispatchEvent::State {
            state: DispatchState::Executing { index: 2 },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"state""#));
        assert!(json.contains(r#""state":"executing""#));
        assert_eq!(event.event_type(), "state");
    }
}
