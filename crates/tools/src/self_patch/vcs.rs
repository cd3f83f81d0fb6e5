//! Version-control seam for self-patching.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("{0} is not inside a git repository")]
    NotARepository(String),

    #[error("`git {command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("could not run git: {0}")]
    Io(String),
}

/// What self-patching needs from version control.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Paths with uncommitted changes (tracked or untracked), relative to
    /// the repository root.
    async fn changed_paths(&self) -> Result<Vec<String>, VcsError>;

    /// Stage `paths` and commit them with `message`; returns the new
    /// commit hash.
    async fn commit(&self, paths: &[String], message: &str) -> Result<String, VcsError>;

    /// Whether the only changes are in `tolerated` paths.
    async fn is_clean(&self, tolerated: &[&str]) -> Result<bool, VcsError> {
        let changed = self.changed_paths().await?;
        Ok(changed.iter().all(|p| tolerated.contains(&p.as_str())))
    }
}

/// `git` on the command line.
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        debug!(repo = %self.repo.display(), ?args, "Running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VcsError::Io(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(VcsError::NotARepository(self.repo.display().to_string()));
            }
            Err(VcsError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr,
            })
        }
    }
}

/// Paths named by `git status --porcelain` output.
pub fn parse_porcelain(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            let path = path.rsplit_once(" -> ").map_or(path, |(_, to)| to);
            path.trim_matches('"').to_string()
        })
        .collect()
}

#[async_trait]
impl VersionControl for GitCli {
    async fn changed_paths(&self) -> Result<Vec<String>, VcsError> {
        let stdout = self.git(&["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&stdout))
    }

    async fn commit(&self, paths: &[String], message: &str) -> Result<String, VcsError> {
        let mut add: Vec<&str> = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.git(&add).await?;
        self.git(&["commit", "-m", message]).await?;
        let hash = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(hash.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcelain_paths() {
        let out = " M src/lib.rs\n?? new file.txt\nR  old.rs -> renamed.rs\n?? \"spaced name.md\"\n";
        assert_eq!(
            parse_porcelain(out),
            vec!["src/lib.rs", "new file.txt", "renamed.rs", "spaced name.md"]
        );
        assert!(parse_porcelain("").is_empty());
    }

    #[tokio::test]
    async fn outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        match git.changed_paths().await {
            Err(VcsError::NotARepository(_)) | Err(VcsError::Io(_)) => {}
            other => panic!("expected repository error, got {other:?}"),
        }
    }
}
