//! `grep`: regex search over file contents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::{Map, Value};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};
use walkdir::{DirEntry, WalkDir};

use crate::args;
use crate::workspace::Workspace;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
];

const DEFAULT_MAX_RESULTS: usize = 200;

pub struct GrepTool {
    workspace: Workspace,
}

impl GrepTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

struct Match {
    file: String,
    line_number: usize,
    line: String,
    context: Vec<String>,
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn search(root: &Path, regex: &Regex, context: usize, max_results: usize) -> (Vec<Match>, bool) {
    let files: Vec<PathBuf> = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_skipped(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        files
    };

    let mut matches = Vec::new();
    for path in files {
        // Non-UTF-8 (binary) and unreadable files are skipped.
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let display = if root.is_file() {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            path.strip_prefix(root)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| path.display().to_string())
        };

        let lines: Vec<&str> = content.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            if matches.len() >= max_results {
                return (matches, true);
            }
            let context_lines = if context > 0 {
                let start = i.saturating_sub(context);
                let end = (i + context + 1).min(lines.len());
                lines[start..end].iter().map(|l| l.to_string()).collect()
            } else {
                Vec::new()
            };
            matches.push(Match {
                file: display.clone(),
                line_number: i + 1,
                line: line.to_string(),
                context: context_lines,
            });
        }
    }
    (matches, false)
}

fn render(matches: &[Match], truncated: bool, max_results: usize) -> String {
    let mut out = Vec::new();
    for m in matches {
        out.push(format!("{}:{}: {}", m.file, m.line_number, m.line));
        if !m.context.is_empty() {
            out.extend(m.context.iter().map(|c| format!("    {c}")));
            out.push(String::new());
        }
    }
    if truncated {
        out.push(format!("[results truncated at {max_results} matches]"));
    }
    out.join("\n")
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regex pattern. Returns matching lines as file:line: text, optionally with context."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "path": { "type": "string", "description": "File or directory (optional, default cwd)" },
                "context": { "type": "integer", "description": "Lines of context around each match (optional)" },
                "max_results": { "type": "integer", "description": "Maximum matches to return (optional, default 200)" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let pattern = args::required_str(arguments, "pattern")?.to_string();
        let context = args::optional_u64(arguments, "context")?.unwrap_or(0) as usize;
        let max_results = args::optional_u64(arguments, "max_results")?
            .map(|m| m as usize)
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let regex = Regex::new(&pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid regex '{pattern}': {e}")))?;

        let root = match args::optional_str(arguments, "path") {
            Some(p) => self.workspace.resolve(p),
            None => self.workspace.root().to_path_buf(),
        };
        if !root.exists() {
            return Err(ToolError::NotFound(format!("Path not found: {}", root.display())));
        }

        let search_root = root.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || {
            search(&search_root, &regex, context, max_results)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "grep".into(),
            reason: e.to_string(),
        })?;

        let data = serde_json::json!({
            "count": matches.len(),
            "pattern": pattern,
            "search_path": root.display().to_string(),
            "truncated": truncated,
        });

        if matches.is_empty() {
            return Ok(ToolOutput::text("No matches found").with_data(data));
        }
        Ok(ToolOutput::text(render(&matches, truncated, max_results)).with_data(data))
    }
}
