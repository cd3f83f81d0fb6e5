//! Agent profiles (personas) and keyword-based selection.
//!
//! Each agent is a directory under the agents dir:
//!
//! - `MASTER_AGENT.md`, the system prompt
//! - `AGENT.md`, metadata: activation keywords from its `## Keywords` and
//!   `## Activation` sections, and whether it is primary in work or
//!   personal mode

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::debug;
use twin_core::Mode;

use crate::error::AgentError;

pub const BUILTIN_AGENT: &str = "assistant";

const WORK_PRIORITY: &[&str] = &["technical-lead", "task-manager", "decision-framework"];
const PERSONAL_PRIORITY: &[&str] = &[
    "health-coach",
    "decision-framework",
    "task-manager",
    "technical-lead",
];

/// Built-in domain vocabulary, checked before catalog keywords.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "health-coach",
        &["health", "meal", "nutrition", "diet", "calorie", "macro", "workout", "exercise", "recipe"],
    ),
    ("travel-agent", &["travel", "trip", "flight", "hotel", "itinerary", "visa"]),
    (
        "technical-lead",
        &["code", "bug", "deploy", "pr", "refactor", "build", "tests", "api", "repo"],
    ),
    ("communication-handler", &["email", "respond", "reply", "draft", "message"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub master_prompt: String,
    pub keywords: Vec<String>,
    pub work_priority: bool,
    pub personal_priority: bool,
    /// `None` for the built-in profile
    pub path: Option<PathBuf>,
}

impl AgentProfile {
    /// Used when no agents are installed.
    pub fn builtin() -> Self {
        Self {
            name: BUILTIN_AGENT.into(),
            master_prompt: "You are a helpful AI assistant for planning and architecture discussions."
                .into(),
            keywords: Vec::new(),
            work_priority: false,
            personal_priority: false,
            path: None,
        }
    }

    fn primary_in(&self, mode: Mode) -> bool {
        match mode {
            Mode::Work => self.work_priority,
            Mode::Personal => self.personal_priority,
        }
    }
}

/// An agent picked for some input, and why.
#[derive(Debug, Clone)]
pub struct AgentSelection {
    pub agent: AgentProfile,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentProfile>,
}

impl AgentCatalog {
    /// Load every agent directory under `dir`. A missing directory yields
    /// an empty catalog.
    pub fn load(dir: &Path) -> Self {
        let mut agents = BTreeMap::new();
        let Ok(entries) = std::fs::read_dir(dir) else {
            debug!(dir = %dir.display(), "No agents directory");
            return Self { agents };
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            agents.insert(name.clone(), load_profile(&name, &path));
        }
        debug!(count = agents.len(), "Agents loaded");
        Self { agents }
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        Self {
            agents: profiles.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Look up an agent by name. The built-in `assistant` is always
    /// available.
    pub fn get(&self, name: &str) -> Result<AgentProfile, AgentError> {
        if let Some(agent) = self.agents.get(name) {
            return Ok(agent.clone());
        }
        if name == BUILTIN_AGENT {
            return Ok(AgentProfile::builtin());
        }
        Err(AgentError::AgentNotFound(name.to_string()))
    }

    /// First installed agent from the mode's priority list, then any agent
    /// marked primary for the mode, then the first agent, then the built-in.
    pub fn default_for_mode(&self, mode: Mode) -> AgentProfile {
        let priority = match mode {
            Mode::Work => WORK_PRIORITY,
            Mode::Personal => PERSONAL_PRIORITY,
        };
        priority
            .iter()
            .find_map(|name| self.agents.get(*name))
            .or_else(|| self.agents.values().find(|a| a.primary_in(mode)))
            .or_else(|| self.agents.values().next())
            .cloned()
            .unwrap_or_else(AgentProfile::builtin)
    }

    /// The agent whose catalog keywords occur most often in `input`.
    pub fn match_by_keywords(&self, input: &str) -> Option<&AgentProfile> {
        let input = input.to_lowercase();
        let mut best: Option<(&AgentProfile, usize)> = None;
        for agent in self.agents.values() {
            let score = agent
                .keywords
                .iter()
                .filter(|k| input.contains(&k.to_lowercase()))
                .count();
            if score > 0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((agent, score));
            }
        }
        best.map(|(agent, _)| agent)
    }

    /// Pick an agent for `input`: the domain table first, then catalog
    /// keywords, else stay with `current`.
    pub fn select_with_reason(&self, input: &str, mode: Mode, current: &AgentProfile) -> AgentSelection {
        let words: Vec<String> = input
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let mut best: Option<(&AgentProfile, Vec<&str>)> = None;
        for (name, vocabulary) in DOMAIN_KEYWORDS {
            let Some(agent) = self.agents.get(*name) else {
                continue;
            };
            let mut matched: Vec<&str> = vocabulary
                .iter()
                .copied()
                .filter(|kw| words.iter().any(|w| w == kw))
                .collect();
            matched.sort_unstable();
            if !matched.is_empty() && best.as_ref().is_none_or(|(_, m)| matched.len() > m.len()) {
                best = Some((agent, matched));
            }
        }
        if let Some((agent, matched)) = best {
            return AgentSelection {
                agent: agent.clone(),
                reason: format!("matched keywords: {}", matched.join(", ")),
            };
        }

        if let Some(agent) = self.match_by_keywords(input) {
            return AgentSelection {
                agent: agent.clone(),
                reason: "matched agent keywords".into(),
            };
        }
        AgentSelection {
            agent: current.clone(),
            reason: format!("default for mode {mode}"),
        }
    }
}

fn load_profile(name: &str, path: &Path) -> AgentProfile {
    let master_prompt = std::fs::read_to_string(path.join("MASTER_AGENT.md")).unwrap_or_default();
    let metadata = std::fs::read_to_string(path.join("AGENT.md")).unwrap_or_default();
    let (work_priority, personal_priority) = mode_priority(&metadata);
    AgentProfile {
        name: name.to_string(),
        master_prompt,
        keywords: extract_keywords(&metadata),
        work_priority,
        personal_priority,
        path: Some(path.to_path_buf()),
    }
}

/// Body of every `#`/`##` heading section whose title starts with `title`
/// (case-insensitive). A section runs to the next `##` line.
fn sections<'a>(content: &'a str, title: &str) -> Vec<Vec<&'a str>> {
    let mut found = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in content.lines() {
        let heading = line.strip_prefix("##").or_else(|| line.strip_prefix('#'));
        if let Some(heading) = heading {
            if let Some(body) = current.take() {
                found.push(body);
            }
            if heading.trim_start_matches('#').trim().to_lowercase().starts_with(title) {
                current = Some(Vec::new());
            }
            continue;
        }
        if let Some(body) = current.as_mut() {
            body.push(line);
        }
    }
    found.extend(current);
    found
}

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted pattern is valid"));
static TICKED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("backtick pattern is valid"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[•\-\*]\s*(.+)$").expect("bullet pattern is valid"));

/// Activation keywords from `AGENT.md`, in order of appearance, without
/// duplicates.
pub fn extract_keywords(content: &str) -> Vec<String> {

    let mut keywords: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let kw = raw.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'').trim();
        if !kw.is_empty() && !keywords.iter().any(|k| k == kw) {
            keywords.push(kw.to_string());
        }
    };

    for section in sections(content, "keyword") {
        for line in section {
            let mut captured = false;
            for re in [&*QUOTED, &*TICKED] {
                for caps in re.captures_iter(line) {
                    push(&caps[1]);
                    captured = true;
                }
            }
            if !captured && let Some(caps) = BULLET.captures(line) {
                push(&caps[1]);
            }
        }
    }
    for section in sections(content, "activation") {
        for line in section {
            for re in [&*QUOTED, &*TICKED] {
                for caps in re.captures_iter(line) {
                    push(&caps[1]);
                }
            }
        }
    }
    keywords
}

/// `(work primary, personal primary)` from phrases like
/// "Work mode: primary".
fn mode_priority(content: &str) -> (bool, bool) {
    let matches = |pattern: &str| Regex::new(pattern).is_ok_and(|re| re.is_match(content));
    (
        matches(r"(?is)work mode.*?primary"),
        matches(r"(?is)personal mode.*?primary"),
    )
}
