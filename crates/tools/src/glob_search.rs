//! `glob`: find files by pattern, newest first.

use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{Map, Value};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::Workspace;

pub struct GlobTool {
    workspace: Workspace,
}

impl GlobTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

/// Matches under `root`, sorted by modification time (newest first).
fn find(root: &std::path::Path, pattern: &str) -> Result<Vec<PathBuf>, ToolError> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let paths = glob::glob(&full)
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob pattern '{pattern}': {e}")))?;

    let mut matches: Vec<(PathBuf, SystemTime)> = paths
        .filter_map(Result::ok)
        .map(|p| {
            let mtime = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (p, mtime)
        })
        .collect();
    matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(matches.into_iter().map(|(p, _)| p).collect())
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. '**/*.rs', 'src/**/*.ts'). Returns paths, most recently modified first."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern" },
                "path": { "type": "string", "description": "Directory to search (optional, default cwd)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let pattern = args::required_str(arguments, "pattern")?.to_string();
        let root = match args::optional_str(arguments, "path") {
            Some(p) => self.workspace.resolve(p),
            None => self.workspace.root().to_path_buf(),
        };
        if !root.exists() {
            return Err(ToolError::NotFound(format!("Path not found: {}", root.display())));
        }

        let search_root = root.clone();
        let pattern_for_task = pattern.clone();
        let matches = tokio::task::spawn_blocking(move || find(&search_root, &pattern_for_task))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "glob".into(),
                reason: e.to_string(),
            })??;

        let data = serde_json::json!({
            "count": matches.len(),
            "pattern": pattern,
            "search_path": root.display().to_string(),
        });

        if matches.is_empty() {
            return Ok(ToolOutput::text("No files found").with_data(data));
        }

        let listed = matches
            .iter()
            .map(|p| {
                p.strip_prefix(&root)
                    .map(|r| r.display().to_string())
                    .unwrap_or_else(|_| p.display().to_string())
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput::text(listed).with_data(data))
    }
}
