//! `read`: file contents with line numbers.

use async_trait::async_trait;
use serde_json::{Map, Value};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::Workspace;

pub struct FileReadTool {
    workspace: Workspace,
}

impl FileReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read file contents. Returns file content with line numbers."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path of the file to read" },
                "offset": { "type": "integer", "description": "Lines to skip (optional)" },
                "limit": { "type": "integer", "description": "Maximum lines to return (optional)" }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let file_path = args::required_str(arguments, "file_path")?;
        let offset = args::optional_u64(arguments, "offset")?.unwrap_or(0) as usize;
        let limit = args::optional_u64(arguments, "limit")?.map(|l| l as usize);

        let path = self.workspace.resolve(file_path);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ToolError::from_io("read", file_path, &e))?;
        if !meta.is_file() {
            return Err(ToolError::NotFound(format!("Not a file: {file_path}")));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::from_io("read", file_path, &e))?;
        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content.lines().collect();

        let end = limit.map_or(lines.len(), |l| offset.saturating_add(l).min(lines.len()));
        let selected = lines.get(offset.min(lines.len())..end).unwrap_or_default();

        let output = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{line}", offset + i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolOutput::text(output).with_data(serde_json::json!({
            "file_path": path.display().to_string(),
            "total_lines": lines.len(),
            "returned_lines": selected.len(),
            "offset": offset,
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

    #[test]
    fn tool_definition() {
        let tool = FileReadTool::new(Workspace::new("/"));
        assert_eq!(tool.name(), "read");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["file_path"]));
    }

    #[tokio::test]
    async fn lines_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{\n  \"port\": 8080\n}\n").unwrap();

        let tool = FileReadTool::new(Workspace::new(dir.path()));
        let out = tool
            .execute(&map(json!({"file_path": "config.json"})))
            .await
            .unwrap();
        assert_eq!(out.output, "     1\t{\n     2\t  \"port\": 8080\n     3\t}");
        assert_eq!(out.data.unwrap()["total_lines"], 3);
    }

    #[tokio::test]
    async fn offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("f.txt"), body).unwrap();

        let tool = FileReadTool::new(Workspace::new(dir.path()));
        let out = tool
            .execute(&map(json!({"file_path": "f.txt", "offset": 3, "limit": "2"})))
            .await
            .unwrap();
        assert_eq!(out.output, "     4\tline 4\n     5\tline 5");
    }

    #[tokio::test]
    async fn offset_past_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\n").unwrap();
        let tool = FileReadTool::new(Workspace::new(dir.path()));
        let out = tool
            .execute(&map(json!({"file_path": "f.txt", "offset": 50})))
            .await
            .unwrap();
        assert!(out.output.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(Workspace::new(dir.path()));
        let err = tool
            .execute(&map(json!({"file_path": "nope.txt"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(Workspace::new(dir.path()));
        let err = tool
            .execute(&map(json!({"file_path": "."})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let tool = FileReadTool::new(Workspace::new("/"));
        assert!(tool.execute(&Map::new()).await.is_err());
    }
}
