//! `bash`: execute a shell command.
//!
//! Supports an optional command allowlist, workspace scoping, and timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::{debug, warn};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::Workspace;

/// Execute shell commands with a timeout.
pub struct ShellTool {
    workspace: Workspace,
    default_timeout: Duration,
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellTool {
    pub fn new(workspace: Workspace, default_timeout: Duration) -> Self {
        Self {
            workspace,
            default_timeout,
            allowed_commands: Vec::new(),
        }
    }

    pub fn with_allowlist(mut self, allowed_commands: Vec<String>) -> Self {
        self.allowed_commands = allowed_commands;
        self
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return true;
        }
        if chains_commands(command) {
            return false;
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }
}

/// Shell syntax that would run a second command after the base one.
const CHAINING: &[&str] = &[";", "&", "|", "`", "$(", "\n", "\r"];

fn chains_commands(command: &str) -> bool {
    CHAINING.iter().any(|op| command.contains(op))
}

/// stdout, then stderr under a `[stderr]` marker when present.
fn render_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{stdout}\n[stderr]\n{stderr}")
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command. Use for git, cargo, npm, docker, etc. Returns stdout and stderr."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" },
                "timeout": {
                    "type": "integer",
                    "description": format!("Timeout in seconds (optional, default {})", self.default_timeout.as_secs())
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let command = args::required_str(arguments, "command")?;
        let timeout = args::optional_u64(arguments, "timeout")?
            .filter(|t| *t > 0)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "bash".into(),
                reason: if chains_commands(command) {
                    "Chained or substituted commands are not allowed with an allowlist".into()
                } else {
                    format!(
                        "Command '{}' not in allowlist",
                        command.split_whitespace().next().unwrap_or("")
                    )
                },
            });
        }

        debug!(command = %command, timeout_secs = timeout.as_secs(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "bash".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "bash".into(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let rendered = render_output(&stdout, &stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            return Err(ToolError::CommandFailed {
                exit_code: code,
                output: rendered,
            });
        }

        Ok(ToolOutput::text(rendered).with_data(serde_json::json!({
            "returncode": 0,
            "command": command,
            "timeout": timeout.as_secs(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twin_core::error::ErrorKind;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn tool() -> ShellTool {
        ShellTool::new(Workspace::current(), Duration::from_secs(30))
    }

    #[test]
    fn allowlist_check() {
        let tool = tool().with_allowlist(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.is_command_allowed("ls -la"));
        assert!(tool.is_command_allowed("git status"));
        assert!(!tool.is_command_allowed("rm -rf /"));
    }

    #[test]
    fn allowlist_rejects_chaining() {
        let tool = tool().with_allowlist(vec!["ls".into()]);
        for command in [
            "ls && touch pwned",
            "ls; rm x",
            "ls || rm x",
            "ls | sh",
            "ls `rm x`",
            "ls $(rm x)",
            "ls &",
            "ls\nrm x",
        ] {
            assert!(!tool.is_command_allowed(command), "{command:?} should be blocked");
        }
    }

    #[test]
    fn chaining_allowed_without_allowlist() {
        assert!(tool().is_command_allowed("ls && echo done"));
    }

    #[test]
    fn empty_allowlist_allows_all() {
        assert!(tool().is_command_allowed("anything goes"));
    }

    #[test]
    fn stderr_section() {
        assert_eq!(render_output("out\n", ""), "out\n");
        assert_eq!(render_output("out\n", "warn\n"), "out\n\n[stderr]\nwarn\n");
    }

    #[tokio::test]
    async fn execute_echo() {
        let out = tool()
            .execute(&map(json!({"command": "echo hello"})))
            .await
            .unwrap();
        assert_eq!(out.output, "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_workspace_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tool = ShellTool::new(Workspace::new(dir.path()), Duration::from_secs(5));
        let out = tool.execute(&map(json!({"command": "ls"}))).await.unwrap();
        assert!(out.output.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_names_code() {
        let err = tool()
            .execute(&map(json!({"command": "echo partial; echo oops >&2; exit 1"})))
            .await
            .unwrap_err();
        match &err {
            ToolError::CommandFailed { exit_code, output } => {
                assert_eq!(*exit_code, 1);
                assert!(output.contains("partial"));
                assert!(output.contains("[stderr]\noops"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(err.to_string().contains("exit code 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_command() {
        let err = tool()
            .execute(&map(json!({"command": "sleep 5", "timeout": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn blocked_command() {
        let tool = tool().with_allowlist(vec!["ls".into()]);
        let result = tool.execute(&map(json!({"command": "rm -rf /"}))).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_command_never_runs_under_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(Workspace::new(dir.path()), Duration::from_secs(5))
            .with_allowlist(vec!["ls".into()]);
        let err = tool
            .execute(&map(json!({"command": "ls && touch pwned"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(!dir.path().join("pwned").exists());
    }
}
