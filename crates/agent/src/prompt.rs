//! Prompt construction.
//!
//! The system prompt is only sent with the first model call of a turn.
//! The follow-up call carries nothing but the original question and this
//! turn's tool results.

use serde_json::Value;
use twin_core::tool::{ToolDefinition, ToolResult};
use twin_core::Mode;

use crate::agents::AgentProfile;
use crate::history::HistoryEntry;

/// How much of each previous session is quoted back.
const HISTORY_EXCERPT_CHARS: usize = 500;

const WORK_MODE: &str = "Current Mode: WORK MODE

- Use professional, technical tone
- Focus on business value and technical accuracy
- Apply full 5 Whys protocol for architecture decisions
- Be concise and actionable";

const PERSONAL_MODE: &str = "Current Mode: PERSONAL MODE

- Use conversational, friendly tone
- Be exploratory and flexible
- Apply 3-5 Whys for major decisions, 1-3 for others
- Can be more verbose and discuss trade-offs";

const FIVE_WHYS: &str = "5 Whys Protocol:
For non-trivial recommendations, you MUST provide:
1. Why Level 1: Direct reason
2. Why Level 2: Underlying benefit
3. Why Level 3: Goal alignment
4. Why Level 4: Value connection
5. Why Level 5: Root principle
6. Trade-offs considered
7. Confidence level and reasoning quality";

/// `name(arg, optional?)` from a tool's JSON schema.
pub fn signature(def: &ToolDefinition) -> String {
    let required: Vec<&str> = def
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let args: Vec<String> = def
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .keys()
                .map(|k| {
                    if required.contains(&k.as_str()) {
                        k.clone()
                    } else {
                        format!("{k}?")
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    format!("{}({})", def.name, args.join(", "))
}

pub fn tool_instructions(tools: &[ToolDefinition]) -> String {
    let listing = tools
        .iter()
        .map(|t| format!("**{}**\n   {}", signature(t), t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"## Available Tools

You have access to these tools to help complete tasks:

{listing}

To use a tool, output in this EXACT format:
```
TOOL_CALL: tool_name
ARGS: {{"arg1": "value1", "arg2": "value2"}}
```

After tool execution, you'll receive:
```
TOOL_RESULT: [success/error]
TOOL: tool_name
OUTPUT: [tool output]
```

Then continue your response based on the tool result.

**Important:**
- Always use tools when you need to interact with files or the system
- Don't make assumptions about file contents - read them first
- Be precise with file paths"#
    )
}

/// Agent prompt, mode guidance, tool instructions and recent history.
pub fn system_prompt(
    agent: &AgentProfile,
    mode: Mode,
    tools: &[ToolDefinition],
    recent: &[HistoryEntry],
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !agent.master_prompt.trim().is_empty() {
        parts.push(agent.master_prompt.trim().to_string());
    }
    parts.push(
        match mode {
            Mode::Work => WORK_MODE,
            Mode::Personal => PERSONAL_MODE,
        }
        .to_string(),
    );
    parts.push(FIVE_WHYS.to_string());
    if !tools.is_empty() {
        parts.push(tool_instructions(tools));
    }
    if !recent.is_empty() {
        let excerpts = recent
            .iter()
            .rev()
            .take(2)
            .rev()
            .map(|s| {
                let excerpt: String = s.content.chars().take(HISTORY_EXCERPT_CHARS).collect();
                format!("Previous session ({}):\n{excerpt}...", s.timestamp)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        parts.push(format!("Previous Context:\n{excerpts}"));
    }
    parts.join("\n\n")
}

/// One `TOOL_RESULT` block per result, in call order.
pub fn format_tool_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|r| {
            let status = if r.success { "success" } else { "error" };
            let body = match (&r.error, r.output.is_empty()) {
                (Some(error), true) => error.clone(),
                (Some(error), false) => format!("{error}\n{}", r.output),
                (None, _) => r.output.clone(),
            };
            format!("TOOL_RESULT: {status}\nTOOL: {}\nOUTPUT: {body}", r.call.name)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn follow_up_prompt(question: &str, results: &[ToolResult]) -> String {
    format!(
        "Original question: {question}\n\nHere are the tool results:\n\n{}\n\nPlease continue your response based on these results.",
        format_tool_results(results)
    )
}
