//! `improve_self`: rewrite files in twin's own source tree and commit them.
//!
//! Every patch goes through the same steps:
//! 1. validate the request (justification, relative paths only)
//! 2. require a clean working tree (changelog edits are tolerated)
//! 3. write each file to a hidden staging sibling
//! 4. snapshot the originals and rename the staged files into place
//! 5. append a changelog entry and commit everything in one commit
//!
//! A failure in step 3 removes the staged files and touches nothing else.
//! A failure in steps 4 or 5 puts the originals and the changelog back.

pub mod changelog;
pub mod vcs;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Map, Value};
use tracing::{info, warn};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::workspace::is_contained_relative;
use changelog::{CHANGELOG_FILE, Entry, HEADER};
pub use vcs::{GitCli, VcsError, VersionControl};

/// A patch that was written and committed.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub id: String,
    pub commit: String,
    pub files: Vec<String>,
}

impl AppliedPatch {
    pub fn short_hash(&self) -> &str {
        self.commit.get(..7).unwrap_or(&self.commit)
    }
}

pub struct SelfPatcher {
    root: PathBuf,
    vcs: Box<dyn VersionControl>,
}

/// Original content of a target before the patch (`None` = didn't exist).
type Snapshot = Vec<(PathBuf, Option<Vec<u8>>)>;

impl SelfPatcher {
    pub fn new(root: impl Into<PathBuf>, vcs: Box<dyn VersionControl>) -> Self {
        Self {
            root: root.into(),
            vcs,
        }
    }

    /// A patcher for the git checkout at `root`.
    pub fn git(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.clone(), Box::new(GitCli::new(root)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recent_improvements(&self, count: usize) -> Vec<String> {
        changelog::recent_improvements(&self.root, count)
    }

    fn validate(description: &str, files: &BTreeMap<String, String>) -> Result<(), ToolError> {
        if description.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "'description' must explain why the change is needed".into(),
            ));
        }
        if files.is_empty() {
            return Err(ToolError::InvalidArguments("'files' must name at least one file".into()));
        }
        for path in files.keys() {
            if !is_contained_relative(path) {
                return Err(ToolError::PermissionDenied {
                    tool_name: "improve_self".into(),
                    reason: format!("'{path}' must be a relative path inside the source tree"),
                });
            }
            if Path::new(path) == Path::new(CHANGELOG_FILE) {
                return Err(ToolError::InvalidArguments(format!(
                    "{CHANGELOG_FILE} is maintained by twin and cannot be patched"
                )));
            }
        }
        Ok(())
    }

    pub async fn apply(
        &self,
        description: &str,
        reasoning: Option<&str>,
        files: &BTreeMap<String, String>,
    ) -> Result<AppliedPatch, ToolError> {
        Self::validate(description, files)?;

        let clean = self
            .vcs
            .is_clean(&[CHANGELOG_FILE])
            .await
            .map_err(|e| ToolError::PreconditionFailed(e.to_string()))?;
        if !clean {
            return Err(ToolError::PreconditionFailed(format!(
                "{} has uncommitted changes; commit or stash them first",
                self.root.display()
            )));
        }

        let now = Local::now();
        let id = now.format("%Y%m%d-%H%M%S").to_string();
        let paths: Vec<String> = files.keys().cloned().collect();

        let changelog_path = self.root.join(CHANGELOG_FILE);
        let changelog_before = snapshot_of(&changelog_path)
            .await
            .map_err(|e| ToolError::from_io("improve_self", CHANGELOG_FILE, &e))?;

        let staged = self.stage(&id, files).await?;
        let snapshot = self.swap_in(&staged).await?;
        let entry = Entry {
            id: &id,
            timestamp: &now.to_rfc3339(),
            description: description.trim(),
            reasoning,
            files: &paths,
        }
        .render();
        if let Err(e) = self.append_changelog(&changelog_path, changelog_before.is_some(), &entry).await {
            restore(&snapshot).await;
            return Err(ToolError::from_io("improve_self", CHANGELOG_FILE, &e));
        }

        let mut commit_paths = paths.clone();
        commit_paths.push(CHANGELOG_FILE.to_string());
        let message = changelog::commit_message(&id, description.trim(), &paths);

        match self.vcs.commit(&commit_paths, &message).await {
            Ok(commit) => {
                info!(id = %id, commit = %commit, files = paths.len(), "Self-improvement committed");
                Ok(AppliedPatch {
                    id,
                    commit,
                    files: paths,
                })
            }
            Err(e) => {
                warn!(id = %id, "Commit failed, restoring originals: {e}");
                restore(&snapshot).await;
                restore(&[(changelog_path, changelog_before)]).await;
                Err(ToolError::ExecutionFailed {
                    tool_name: "improve_self".into(),
                    reason: format!("commit failed, changes rolled back: {e}"),
                })
            }
        }
    }

    /// Write every file to a hidden sibling. Returns (staged, target) pairs.
    async fn stage(
        &self,
        id: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<Vec<(PathBuf, PathBuf)>, ToolError> {
        let mut staged = Vec::with_capacity(files.len());
        for (rel, content) in files {
            let target = self.root.join(rel);
            let file_name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let staging = target.with_file_name(format!(".{file_name}.twin-stage-{id}"));

            let result = async {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&staging, content).await
            }
            .await;

            if let Err(e) = result {
                warn!(file = %rel, "Staging failed, discarding staged files: {e}");
                for (path, _) in &staged {
                    let _ = tokio::fs::remove_file(path).await;
                }
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(ToolError::from_io("improve_self", rel, &e));
            }
            staged.push((staging, target));
        }
        Ok(staged)
    }

    /// Snapshot each target and rename its staged file over it.
    ///
    /// A target that exists but can't be read aborts before any rename.
    async fn swap_in(&self, staged: &[(PathBuf, PathBuf)]) -> Result<Snapshot, ToolError> {
        let mut snapshot: Snapshot = Vec::with_capacity(staged.len());
        for (_, target) in staged {
            match snapshot_of(target).await {
                Ok(original) => snapshot.push((target.clone(), original)),
                Err(e) => {
                    warn!(target = %target.display(), "Cannot snapshot original, aborting: {e}");
                    for (path, _) in staged {
                        let _ = tokio::fs::remove_file(path).await;
                    }
                    return Err(ToolError::from_io(
                        "improve_self",
                        &target.display().to_string(),
                        &e,
                    ));
                }
            }
        }

        for (i, (staging, target)) in staged.iter().enumerate() {
            if let Err(e) = tokio::fs::rename(staging, target).await {
                warn!(target = %target.display(), "Rename failed, restoring originals: {e}");
                restore(&snapshot[..i]).await;
                for (rest, _) in &staged[i..] {
                    let _ = tokio::fs::remove_file(rest).await;
                }
                return Err(ToolError::from_io(
                    "improve_self",
                    &target.display().to_string(),
                    &e,
                ));
            }
        }
        Ok(snapshot)
    }

    async fn append_changelog(&self, path: &Path, exists: bool, entry: &str) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        if !exists {
            file.write_all(HEADER.as_bytes()).await?;
        }
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

/// Current content of `path`, or `None` when it doesn't exist.
async fn snapshot_of(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Put each path back to its snapshot; paths that didn't exist are removed.
async fn restore(snapshot: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, original) in snapshot {
        let result = match original {
            Some(bytes) => tokio::fs::write(path, bytes).await,
            None => tokio::fs::remove_file(path).await,
        };
        if let Err(e) = result {
            warn!(path = %path.display(), "Could not restore: {e}");
        }
    }
}

/// The `improve_self` tool.
pub struct ImproveSelfTool {
    patcher: SelfPatcher,
}

impl ImproveSelfTool {
    pub fn new(patcher: SelfPatcher) -> Self {
        Self { patcher }
    }
}

/// `files` as an object of path → content, or that object encoded as a string.
fn files_argument(arguments: &Map<String, Value>) -> Result<BTreeMap<String, String>, ToolError> {
    let value = match arguments.get("files") {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).map_err(|e| {
            ToolError::InvalidArguments(format!("'files' is not a JSON object: {e}"))
        })?,
        Some(v) => v.clone(),
        None => return Err(ToolError::InvalidArguments("Missing 'files' argument".into())),
    };
    let Value::Object(map) = value else {
        return Err(ToolError::InvalidArguments(
            "'files' must be an object of path -> full content".into(),
        ));
    };
    map.into_iter()
        .map(|(path, content)| match content {
            Value::String(s) => Ok((path, s)),
            _ => Err(ToolError::InvalidArguments(format!(
                "content for '{path}' must be a string"
            ))),
        })
        .collect()
}

#[async_trait]
impl Tool for ImproveSelfTool {
    fn name(&self) -> &str {
        "improve_self"
    }

    fn description(&self) -> &str {
        "Modify twin's own source code. Writes the given files (full content) and commits them with a changelog entry. Requires a clean git tree and a justification."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "What changes and why (required)" },
                "reasoning": { "type": "string", "description": "Longer analysis (optional)" },
                "files": {
                    "type": "object",
                    "description": "Map of relative path -> complete new file content",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["description", "files"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let description = args::required_str(arguments, "description")?;
        let reasoning = args::optional_str(arguments, "reasoning");
        let files = files_argument(arguments)?;

        let applied = self.patcher.apply(description, reasoning, &files).await?;
        Ok(ToolOutput::text(format!(
            "Improvement {} applied and committed as {}",
            applied.id,
            applied.short_hash()
        ))
        .with_data(serde_json::json!({
            "id": applied.id,
            "commit": applied.commit,
            "files": applied.files,
        })))
    }
}
