//! `edit`: replace one exact, unique occurrence of a string in a file.
//!
//! The file is read at execution time, so several edits to one file in the
//! same turn each see the result of the previous one.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::Workspace;

pub struct FileEditTool {
    workspace: Workspace,
}

impl FileEditTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

/// Start offsets of every occurrence of `needle`, overlapping ones included.
fn match_starts(haystack: &str, needle: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        starts.push(start);
        let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
        from = start + step;
    }
    starts
}

/// Replace the single occurrence of `old` in `content`.
pub fn replace_unique(
    content: &str,
    old: &str,
    new: &str,
    path: &str,
) -> Result<String, ToolError> {
    match match_starts(content, old).as_slice() {
        [] => Err(ToolError::NoMatch {
            path: path.to_string(),
            snippet: old.chars().take(50).collect(),
        }),
        [start] => {
            let mut updated = String::with_capacity(content.len() - old.len() + new.len());
            updated.push_str(&content[..*start]);
            updated.push_str(new);
            updated.push_str(&content[start + old.len()..]);
            Ok(updated)
        }
        starts => Err(ToolError::AmbiguousMatch {
            path: path.to_string(),
            count: starts.len(),
        }),
    }
}

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit an existing file by replacing old_string with new_string. Exact match required; old_string must occur exactly once."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "The file to edit" },
                "old_string": { "type": "string", "description": "Exact text to replace (must be unique)" },
                "new_string": { "type": "string", "description": "Replacement text" }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let file_path = args::required_str(arguments, "file_path")?;
        let old = args::str_alias(arguments, &["old_string", "old_text"]).ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'old_string' argument".into())
        })?;
        let new = args::str_alias(arguments, &["new_string", "new_text"]).ok_or_else(|| {
            ToolError::InvalidArguments("Missing 'new_string' argument".into())
        })?;
        if old.is_empty() {
            return Err(ToolError::InvalidArguments("'old_string' must not be empty".into()));
        }

        let path = self.workspace.resolve(file_path);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::from_io("edit", file_path, &e))?;

        let updated = replace_unique(&content, old, new, file_path)?;
        tokio::fs::write(&path, &updated)
            .await
            .map_err(|e| ToolError::from_io("edit", file_path, &e))?;

        debug!(file = %file_path, removed = old.len(), inserted = new.len(), "Edited file");
        Ok(ToolOutput::text(format!("Edited {file_path}")).with_data(serde_json::json!({
            "file_path": path.display().to_string(),
            "replacements": 1,
            "old_length": old.len(),
            "new_length": new.len(),
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

    fn setup(content: &str) -> (tempfile::TempDir, FileEditTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), content).unwrap();
        let tool = FileEditTool::new(Workspace::new(dir.path()));
        (dir, tool)
    }

    #[tokio::test]
    async fn unique_match_replaced_once() {
        let (dir, tool) = setup("alpha\nbeta\ngamma\n");
        tool.execute(&map(json!({
            "file_path": "f.txt", "old_string": "beta", "new_string": "BETA"
        })))
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "alpha\nBETA\ngamma\n"
        );
    }

    #[tokio::test]
    async fn text_aliases_accepted() {
        let (dir, tool) = setup("x = 1\n");
        tool.execute(&map(json!({
            "file_path": "f.txt", "old_text": "x = 1", "new_text": "x = 2"
        })))
        .await
        .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "x = 2\n");
    }

    #[tokio::test]
    async fn no_match_leaves_file_untouched() {
        let (dir, tool) = setup("alpha\n");
        let err = tool
            .execute(&map(json!({
                "file_path": "f.txt", "old_string": "omega", "new_string": "x"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoMatch);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "alpha\n");
    }

    #[tokio::test]
    async fn ambiguous_match_leaves_file_untouched() {
        let (dir, tool) = setup("dup\ndup\n");
        let err = tool
            .execute(&map(json!({
                "file_path": "f.txt", "old_string": "dup", "new_string": "x"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert!(err.to_string().contains("2 times"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "dup\ndup\n");
    }

    #[tokio::test]
    async fn overlapping_matches_are_ambiguous() {
        let (dir, tool) = setup("aaa");
        let err = tool
            .execute(&map(json!({
                "file_path": "f.txt", "old_string": "aa", "new_string": "X"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert!(err.to_string().contains("2 times"));
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "aaa");
    }

    #[test]
    fn match_starts_counts_overlaps() {
        assert_eq!(match_starts("abababa", "aba"), vec![0, 2, 4]);
        assert_eq!(match_starts("héllo héllo", "héllo"), vec![0, 7]);
        assert!(match_starts("abc", "x").is_empty());
    }

    #[tokio::test]
    async fn empty_old_string_rejected() {
        let (_dir, tool) = setup("abc");
        let err = tool
            .execute(&map(json!({
                "file_path": "f.txt", "old_string": "", "new_string": "x"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_file_not_found() {
        let (_dir, tool) = setup("abc");
        let err = tool
            .execute(&map(json!({
                "file_path": "ghost.txt", "old_string": "a", "new_string": "b"
            })))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn replace_unique_keeps_surroundings() {
        let out = replace_unique("fn a() {}\nfn b() {}\n", "fn b", "fn c", "x.rs").unwrap();
        assert_eq!(out, "fn a() {}\nfn c() {}\n");
    }
}
