//! Plain-text session history, one file per working directory.
//!
//! Files live in the context directory and are named after a hash of the
//! directory path, so every repository gets its own log:
//!
//! ```text
//! # Repository: /home/me/projects/twin
//!
//! ---
//!
//! ## 2026-03-14 10:42 - Session 1a2b3c4d [TWIN] [WORK MODE]
//!
//! ### Planning Discussion
//! ...
//! ---
//! ```
//!
//! Entries are only ever appended.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex_lite::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;
use twin_core::{ConversationTurn, Mode};

use crate::error::AgentError;
use crate::session::SessionContext;

/// One parsed `## <timestamp> - ...` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// `YYYY-MM-DD HH:MM`
    pub timestamp: String,
    pub session_id: Option<String>,
    /// Who wrote the entry (`TWIN`, or `CLAUDE` for entries from other tools)
    pub source: String,
    pub mode: Mode,
    pub content: String,
}

impl HistoryEntry {
    /// First line of the planning discussion, up to 100 characters.
    pub fn topic(&self) -> Option<String> {
        let (_, rest) = self.content.split_once("### Planning Discussion\n")?;
        let section = rest.split("\n###").next().unwrap_or_default();
        let line = section.trim().lines().next()?;
        let line = line.strip_prefix("**User:** ").unwrap_or(line);
        Some(line.chars().take(100).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub repository: String,
    pub sessions: Vec<HistoryEntry>,
}

/// The directory holding `context-*.txt` files.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `context-<first 8 hex chars of sha256(cwd)>.txt`
    pub fn file_name(cwd: &Path) -> String {
        let digest = Sha256::digest(cwd.to_string_lossy().as_bytes());
        format!("context-{}.txt", &hex::encode(digest)[..8])
    }

    pub fn path_for(&self, cwd: &Path) -> PathBuf {
        self.dir.join(Self::file_name(cwd))
    }

    /// Append the session's unsaved turns as one entry.
    ///
    /// Returns the file written, or `None` when there was nothing new.
    pub fn append(
        &self,
        cwd: &Path,
        session: &mut SessionContext,
    ) -> Result<Option<PathBuf>, AgentError> {
        if session.unsaved_turns().is_empty() {
            return Ok(None);
        }
        let path = self.path_for(cwd);
        std::fs::create_dir_all(&self.dir).map_err(|e| AgentError::history(&self.dir, e))?;

        let is_new = !path.exists();
        let mut entry = String::new();
        if is_new {
            entry.push_str(&format!("# Repository: {}\n\n---\n\n", cwd.display()));
        }
        entry.push_str(&render_entry(session, session.unsaved_turns(), Local::now()));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AgentError::history(&path, e))?;
        file.write_all(entry.as_bytes())
            .map_err(|e| AgentError::history(&path, e))?;

        session.mark_saved();
        debug!(path = %path.display(), session = %session.id(), "Session history saved");
        Ok(Some(path))
    }

    pub fn load(&self, cwd: &Path) -> Result<Option<History>, AgentError> {
        let path = self.path_for(cwd);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(parse(&content, cwd))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::history(&path, e)),
        }
    }

    /// The last `count` entries, oldest first.
    pub fn recent_sessions(&self, cwd: &Path, count: usize) -> Result<Vec<HistoryEntry>, AgentError> {
        let Some(history) = self.load(cwd)? else {
            return Ok(Vec::new());
        };
        let skip = history.sessions.len().saturating_sub(count);
        Ok(history.sessions.into_iter().skip(skip).collect())
    }

    /// Human-readable recap of the stored history.
    pub fn summary(&self, cwd: &Path) -> Result<String, AgentError> {
        let Some(history) = self.load(cwd)? else {
            return Ok("No previous context found".into());
        };
        let Some(last) = history.sessions.last() else {
            return Ok("Context file exists but no sessions found".into());
        };
        let mode = match last.mode {
            Mode::Work => "Work",
            Mode::Personal => "Personal",
        };
        let mut lines = vec![
            format!("Found {} previous session(s)", history.sessions.len()),
            format!("Last session: {}", last.timestamp),
            format!("Mode: {mode}"),
            format!("Source: {}", last.source),
        ];
        if let Some(topic) = last.topic() {
            lines.push(format!("Topic: {topic}"));
        }
        Ok(lines.join("\n"))
    }

    /// Delete the history file; returns whether one existed.
    pub fn clear(&self, cwd: &Path) -> Result<bool, AgentError> {
        let path = self.path_for(cwd);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AgentError::history(&path, e)),
        }
    }
}

fn render_entry(session: &SessionContext, turns: &[ConversationTurn], now: DateTime<Local>) -> String {
    let mut out = format!(
        "## {} - Session {} [TWIN] [{} MODE]\n\n",
        now.format("%Y-%m-%d %H:%M"),
        session.id(),
        session.mode().as_str().to_uppercase()
    );

    let discussion = turns
        .iter()
        .map(|t| format!("**User:** {}\n\n**Assistant:** {}\n", t.user_input.trim(), t.final_answer.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str(&format!("### Planning Discussion\n{discussion}\n"));
    out.push_str(&format!("### Agent Active\n{}\n\n", session.agent()));
    out.push_str(&format!("### Model\n{}\n\n", session.model()));

    let tools: Vec<String> = turns
        .iter()
        .flat_map(|t| &t.tool_results)
        .map(|r| {
            if r.success {
                format!("- {} ✓", r.call.name)
            } else {
                format!("- {} ✗", r.call.name)
            }
        })
        .collect();
    if !tools.is_empty() {
        out.push_str(&format!("### Tools Used\n{}\n\n", tools.join("\n")));
    }
    out.push_str("---\n\n");
    out
}

static ENTRY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## (\d{4}-\d{2}-\d{2} \d{2}:\d{2}) - (.*)$").expect("entry header pattern is valid")
});

/// Parse a history file. Text outside entries is ignored.
pub fn parse(content: &str, cwd: &Path) -> History {
    let repository = content
        .lines()
        .find_map(|l| l.strip_prefix("# Repository: "))
        .map(|r| r.trim().to_string())
        .unwrap_or_else(|| cwd.display().to_string());

    let mut sessions: Vec<HistoryEntry> = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    for line in content.lines() {
        match ENTRY_HEADER.captures(line) {
            Some(caps) => {
                finish_entry(sessions.last_mut(), &body);
                body.clear();
                sessions.push(entry_from_header(&caps[1], &caps[2]));
            }
            None => body.push(line),
        }
    }
    finish_entry(sessions.last_mut(), &body);

    History { repository, sessions }
}

fn finish_entry(entry: Option<&mut HistoryEntry>, body: &[&str]) {
    if let Some(entry) = entry {
        let text = body.join("\n");
        let text = text.trim();
        entry.content = text.strip_suffix("---").unwrap_or(text).trim().to_string();
    }
}

fn entry_from_header(timestamp: &str, header: &str) -> HistoryEntry {
    let capture = |pattern: &str| {
        Regex::new(pattern)
            .ok()
            .and_then(|re| re.captures(header).map(|c| (c[1].to_string(), c.get(2).map(|m| m.as_str().to_string()))))
    };
    let session_id = capture(r"Session ([a-f0-9]+)").map(|(id, _)| id);
    let (source, mode) = match capture(r"\[(TWIN|CLAUDE)\].*?\[([A-Z ]+) MODE\]") {
        Some((source, Some(mode))) if mode.trim() == "WORK" => (source, Mode::Work),
        Some((source, _)) => (source, Mode::Personal),
        None => ("CLAUDE".to_string(), Mode::Personal),
    };
    HistoryEntry {
        timestamp: timestamp.to_string(),
        session_id,
        source,
        mode,
        content: String::new(),
    }
}
