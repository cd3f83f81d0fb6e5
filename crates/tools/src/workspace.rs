//! Path resolution against the session's working directory.

use std::path::{Component, Path, PathBuf};

/// The directory tool paths are resolved against.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The process working directory, or `.` if it can't be read.
    pub fn current() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Expand a leading `~` and anchor relative paths at the root.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let expanded = if raw == "~" {
            twin_config::dirs_home()
        } else if let Some(rest) = raw.strip_prefix("~/") {
            twin_config::dirs_home().join(rest)
        } else {
            PathBuf::from(raw)
        };

        if expanded.is_absolute() {
            expanded
        } else {
            self.root.join(expanded)
        }
    }
}

/// True for relative paths that name something below the root: no `..`,
/// root or prefix components, and at least one normal component.
pub fn is_contained_relative(path: &str) -> bool {
    let p = Path::new(path);
    p.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && p.components().any(|c| matches!(c, Component::Normal(_)))
}
