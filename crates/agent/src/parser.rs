//! Extraction of tool calls from model output.
//!
//! Two shapes are recognized, and calls are returned in the order they
//! appear in the text:
//!
//! ```text
//! TOOL_CALL: read
//! ARGS: {"file_path": "config.json"}
//! ```
//!
//! and a fenced JSON block whose payload is
//! `{"tool_calls": [{"name": "read", "args": {...}}]}`.
//!
//! Parsing never fails. A marker block that can't be understood becomes a
//! malformed [`ToolCall`] so the dispatch loop can report it back.

use std::ops::Range;

use serde_json::Value;
use twin_core::tool::ToolCall;

const TOOL_CALL_MARKER: &str = "TOOL_CALL:";
const ARGS_MARKER: &str = "ARGS:";
const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// A call plus the byte range of the text it was parsed from.
#[derive(Debug)]
struct Located {
    span: Range<usize>,
    call: ToolCall,
}

/// Every tool call in `text`, in textual order.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    locate(text).into_iter().map(|l| l.call).collect()
}

/// `text` with every tool-call block removed, for display.
pub fn strip_tool_calls(text: &str) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for located in locate(text) {
        if located.span.start >= cursor {
            kept.push_str(&text[cursor..located.span.start]);
            cursor = located.span.end;
        }
    }
    kept.push_str(&text[cursor.min(text.len())..]);
    collapse_blank_lines(&kept)
}

fn locate(text: &str) -> Vec<Located> {
    let fenced = fenced_calls(text);
    let mut all: Vec<Located> = marker_calls(text)
        .into_iter()
        .filter(|m| !fenced.iter().any(|f| f.span.contains(&m.span.start)))
        .collect();
    all.extend(fenced);
    all.sort_by_key(|l| l.span.start);
    all
}

/// Byte offset of the start of the line after the one containing `pos`.
fn next_line_start(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i + 1)
}

fn marker_calls(text: &str) -> Vec<Located> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while cursor < text.len() {
        let after_line = next_line_start(text, cursor);
        let line = text[cursor..after_line].trim_end_matches(['\n', '\r']);
        match line.trim_start().strip_prefix(TOOL_CALL_MARKER) {
            Some(rest) => {
                let (call, end) = marker_block(text, rest, after_line);
                found.push(Located { span: cursor..end, call });
                cursor = if end <= after_line {
                    after_line
                } else if text[..end].ends_with('\n') {
                    end
                } else {
                    next_line_start(text, end)
                };
            }
            None => cursor = after_line,
        }
    }
    found
}

/// Parse one marker block whose `TOOL_CALL:` line ends at `after_line`.
/// Returns the call and the end of the consumed text.
fn marker_block(text: &str, name_part: &str, after_line: usize) -> (ToolCall, usize) {
    let name: String = name_part
        .trim()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if name.is_empty() {
        return (
            ToolCall::malformed("", "TOOL_CALL marker without a tool name"),
            after_line,
        );
    }

    // The ARGS line is the next non-blank line.
    let mut line_start = after_line;
    let args_line = loop {
        if line_start >= text.len() {
            break None;
        }
        let line_end = next_line_start(text, line_start);
        let line = &text[line_start..line_end];
        if line.trim().is_empty() {
            line_start = line_end;
            continue;
        }
        break Some((line_start, line_end, line));
    };
    let Some((line_start, line_end, line)) = args_line else {
        return (ToolCall::malformed(name, "missing ARGS line"), after_line);
    };
    let indent = line.len() - line.trim_start().len();
    if !line[indent..].starts_with(ARGS_MARKER) {
        return (ToolCall::malformed(name, "missing ARGS line"), after_line);
    }

    let args_start = line_start + indent + ARGS_MARKER.len();
    let Some(brace) = text[args_start..]
        .find(|c: char| !c.is_whitespace())
        .map(|i| args_start + i)
        .filter(|&i| text[i..].starts_with('{'))
    else {
        return (ToolCall::malformed(name, "ARGS is not a JSON object"), line_end);
    };
    let Some(end) = matching_brace(text, brace) else {
        return (ToolCall::malformed(name, "unbalanced braces in ARGS"), line_end);
    };

    let call = match serde_json::from_str::<Value>(&text[brace..end]) {
        Ok(Value::Object(arguments)) => ToolCall::new(name, arguments),
        Ok(_) => ToolCall::malformed(name, "ARGS is not a JSON object"),
        Err(e) => ToolCall::malformed(name, format!("invalid JSON in ARGS: {e}")),
    };
    (call, end)
}

/// End (exclusive) of the object opened at `open`, skipping braces that
/// sit inside JSON string literals.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[open..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_calls(text: &str) -> Vec<Located> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find(JSON_FENCE) {
        let start = cursor + offset;
        let body_start = next_line_start(text, start);
        let Some(close) = text[body_start..].find(FENCE).map(|i| body_start + i) else {
            break;
        };
        let end = close + FENCE.len();
        cursor = end;

        let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(&text[body_start..close])
        else {
            continue;
        };
        let Some(Value::Array(entries)) = payload.get("tool_calls") else {
            continue;
        };
        // Every call from one block shares the block's span.
        for entry in entries {
            found.push(Located {
                span: start..end,
                call: structured_call(entry),
            });
        }
    }
    found
}

fn structured_call(entry: &Value) -> ToolCall {
    let name = entry.get("name").and_then(Value::as_str);
    let args = entry.get("args").or_else(|| entry.get("arguments"));
    match (name, args) {
        (None, _) => ToolCall::malformed("", "tool_calls entry without a string 'name'"),
        (Some(name), None) => ToolCall::new(name, serde_json::Map::new()),
        (Some(name), Some(Value::Object(arguments))) => ToolCall::new(name, arguments.clone()),
        (Some(name), Some(_)) => ToolCall::malformed(name, "'args' is not a JSON object"),
    }
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}
