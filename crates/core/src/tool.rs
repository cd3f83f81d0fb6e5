//! Tool trait: the abstraction over the local operations a model may request.
//!
//! Tools are what let the model act on the machine: read and edit files,
//! run shell commands, search the filesystem or the web, and patch twin's
//! own source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ErrorKind, ToolError};

/// A request to execute a tool, extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Set when the argument block could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            parse_error: None,
        }
    }

    /// A call whose arguments could not be understood.
    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
            parse_error: Some(reason.into()),
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.parse_error.is_some()
    }

    /// `key=value, ...` rendering for progress lines.
    pub fn display_arguments(&self) -> String {
        self.arguments
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={}", truncate(s, 60)),
                other => format!("{k}={}", truncate(&other.to_string(), 60)),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// What an executor produces on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the model
    pub output: String,

    /// Optional structured metadata (paths touched, counts, exit codes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The result of one tool call. Exactly one exists per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call this result answers
    pub call: ToolCall,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (may be empty)
    pub output: String,

    /// Error message for failed calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error classification for failed calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn succeeded(call: ToolCall, output: ToolOutput) -> Self {
        Self {
            call,
            success: true,
            output: output.output,
            error: None,
            error_kind: None,
            data: output.data,
        }
    }

    pub fn failed(call: ToolCall, err: &ToolError) -> Self {
        Self {
            call,
            success: false,
            output: err.partial_output().unwrap_or_default().to_string(),
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            data: None,
        }
    }
}

/// A tool definition rendered into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Each executor (read, write, edit, bash, glob, grep, web_search,
/// web_fetch, improve_self) implements this trait and is registered in the
/// `ToolRegistry`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "bash", "read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for the system prompt.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, kept in registration order so the
/// prompt lists them deterministically.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Remove a tool by name, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        before != self.tools.len()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for the system prompt).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call, surfacing failures as errors.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        if let Some(reason) = &call.parse_error {
            return Err(ToolError::InvalidArguments(format!(
                "could not parse arguments for '{}': {reason}",
                call.name
            )));
        }
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        tool.execute(&call.arguments).await
    }

    /// Execute a tool call and fold the outcome into a `ToolResult`.
    ///
    /// Never fails: unknown tools, malformed calls and executor errors all
    /// become failed results.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match self.execute(call).await {
            Ok(output) => {
                debug!(tool = %call.name, bytes = output.output.len(), "Tool succeeded");
                ToolResult::succeeded(call.clone(), output)
            }
            Err(err) => {
                warn!(tool = %call.name, kind = %err.kind(), "Tool failed: {err}");
                ToolResult::failed(call.clone(), &err)
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
