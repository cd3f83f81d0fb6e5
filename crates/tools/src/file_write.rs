//! `write`: create or overwrite a file.

use async_trait::async_trait;
use serde_json::{Map, Value};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::Workspace;

pub struct FileWriteTool {
    workspace: Workspace,
}

impl FileWriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with new content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "The file path to write to" },
                "content": { "type": "string", "description": "The full file content" }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let file_path = args::required_str(arguments, "file_path")?;
        let content = args::required_str(arguments, "content")?;
        let path = self.workspace.resolve(file_path);

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(ToolError::from_io("write", &parent.display().to_string(), &e));
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::from_io("write", file_path, &e))?;

        Ok(ToolOutput::text(format!("Created {file_path}")).with_data(serde_json::json!({
            "file_path": path.display().to_string(),
            "bytes_written": content.len(),
            "lines": content.lines().count(),
        })))
    }
}
