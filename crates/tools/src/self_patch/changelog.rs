//! `IMPROVEMENTS.md`, the append-only record of self-patches.

use std::path::Path;

pub const CHANGELOG_FILE: &str = "IMPROVEMENTS.md";

pub const HEADER: &str = "# Twin Self-Improvements Log

This file tracks all autonomous improvements made by twin to itself.

Each improvement includes:
- Timestamp
- Description
- Reasoning
- Files changed

---

";

pub struct Entry<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub description: &'a str,
    pub reasoning: Option<&'a str>,
    pub files: &'a [String],
}

impl Entry<'_> {
    pub fn render(&self) -> String {
        let files = self
            .files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\n## {id} - {description}\n\n**Timestamp:** {timestamp}\n\n**Reasoning:**\n{reasoning}\n\n**Files Changed:**\n{files}\n\n**Status:** Applied\n\n---\n\n",
            id = self.id,
            description = self.description,
            timestamp = self.timestamp,
            reasoning = self.reasoning.unwrap_or("(none given)"),
        )
    }
}

/// Commit message for an applied patch.
pub fn commit_message(id: &str, description: &str, files: &[String]) -> String {
    let files = files
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "[SELF-IMPROVEMENT] {description}\n\nImprovement ID: {id}\nAutonomous improvement by twin\n\nFiles changed:\n{files}\n\nSee {CHANGELOG_FILE} for full reasoning."
    )
}

/// Titles (`<id> - <description>`) of the last `count` entries, newest first.
pub fn recent_titles(content: &str, count: usize) -> Vec<String> {
    let titles: Vec<String> = content
        .split("\n## ")
        .skip(1)
        .filter_map(|entry| entry.lines().next())
        .map(|t| t.trim().to_string())
        .collect();
    titles.into_iter().rev().take(count).collect()
}

/// Read `IMPROVEMENTS.md` under `root` and list its latest entries.
pub fn recent_improvements(root: &Path, count: usize) -> Vec<String> {
    std::fs::read_to_string(root.join(CHANGELOG_FILE))
        .map(|c| recent_titles(&c, count))
        .unwrap_or_default()
}
