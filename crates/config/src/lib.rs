//! Configuration loading, validation, and management for twin.
//!
//! Loads configuration from `~/.twin/config.toml` with environment
//! variable overrides, plus an optional per-repository
//! `.twin/settings.local.toml`. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use twin_core::Mode;

/// The root configuration structure.
///
/// Maps directly to `~/.twin/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model (name or alias)
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Mode forced for every session (skips detection)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<Mode>,

    /// Short names for models, e.g. `fast = "qwen2.5-coder:7b"`
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, String>,

    /// Ollama connection settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Tool executor settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Work / personal detection settings
    #[serde(default)]
    pub mode: ModeConfig,

    /// Directory overrides
    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}

fn default_models() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("fast".into(), "qwen2.5-coder:7b".into()),
        ("smart".into(), "qwen2.5-coder:32b".into()),
        ("vision".into(), "llava:7b".into()),
    ])
}

/// How twin talks to Ollama.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// `POST /api/generate` on the local server
    #[default]
    Http,
    /// `ollama run <model> <prompt>` subprocess
    Cli,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default)]
    pub transport: Transport,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context window size passed as `options.num_ctx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            transport: Transport::default(),
            timeout_secs: default_request_timeout(),
            temperature: default_temperature(),
            num_ctx: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default timeout for `bash` when the call doesn't pass one
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// If non-empty, only these base commands may run.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Tools that are never registered.
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Optional text-cleaning proxy for `web_fetch`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_proxy_url: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// DuckDuckGo HTML endpoint used by `web_search`
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,

    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Fetched page text is truncated beyond this many characters.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_shell_timeout() -> u64 {
    30
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".into()
}
fn default_search_timeout() -> u64 {
    15
}
fn default_max_content_chars() -> usize {
    25_000
}
fn default_user_agent() -> String {
    format!("twin/{} (+local assistant)", env!("CARGO_PKG_VERSION"))
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            allowed_commands: vec![],
            disabled: vec![],
            fetch_proxy_url: None,
            fetch_timeout_secs: default_fetch_timeout(),
            search_endpoint: default_search_endpoint(),
            search_timeout_secs: default_search_timeout(),
            max_content_chars: default_max_content_chars(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Substrings of the working directory that mean work mode
    #[serde(default = "default_work_patterns")]
    pub work_patterns: Vec<String>,

    #[serde(default = "default_personal_patterns")]
    pub personal_patterns: Vec<String>,

    /// Substrings of `git config user.email` that mean work mode
    #[serde(default)]
    pub work_emails: Vec<String>,

    #[serde(default)]
    pub work_hours: WorkHours,
}

fn default_work_patterns() -> Vec<String> {
    vec!["/work/".into(), "/projects/".into()]
}
fn default_personal_patterns() -> Vec<String> {
    vec!["/personal/".into(), "/side-projects/".into()]
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            work_patterns: default_work_patterns(),
            personal_patterns: default_personal_patterns(),
            work_emails: vec![],
            work_hours: WorkHours::default(),
        }
    }
}

/// Working hours; `days` uses 0 = Monday … 6 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkHours {
    #[serde(default = "default_work_days")]
    pub days: Vec<u8>,

    #[serde(default = "default_work_start")]
    pub start: u8,

    #[serde(default = "default_work_end")]
    pub end: u8,
}

fn default_work_days() -> Vec<u8> {
    vec![0, 1, 2, 3, 4]
}
fn default_work_start() -> u8 {
    9
}
fn default_work_end() -> u8 {
    18
}

impl Default for WorkHours {
    fn default() -> Self {
        Self {
            days: default_work_days(),
            start: default_work_start(),
            end: default_work_end(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Agent profiles (default `~/.twin/agents`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<PathBuf>,

    /// Session history files (default `~/.twin/context`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<PathBuf>,

    /// Git checkout that `improve_self` patches. Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
}

/// Per-repository overrides read from `<repo>/.twin/settings.local.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Locks the repository to one mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl LocalSettings {
    pub const RELATIVE_PATH: &'static str = ".twin/settings.local.toml";

    /// Load the settings for `repo`; a missing file yields defaults.
    pub fn load(repo: &Path) -> Result<Self, ConfigError> {
        let path = repo.join(Self::RELATIVE_PATH);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            reason: e.to_string(),
        })
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.twin/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TWIN_MODEL`, `TWIN_MODE`
    /// - `TWIN_OLLAMA_URL`, `TWIN_FETCH_PROXY`
    /// - `TWIN_SOURCE_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = var("TWIN_MODEL") {
            self.default_model = model;
        }
        if let Some(mode) = var("TWIN_MODE") {
            let mode = mode.parse::<Mode>().map_err(ConfigError::ValidationError)?;
            self.default_mode = Some(mode);
        }
        if let Some(url) = var("TWIN_OLLAMA_URL") {
            self.ollama.base_url = url;
        }
        if let Some(proxy) = var("TWIN_FETCH_PROXY") {
            self.tools.fetch_proxy_url = Some(proxy);
        }
        if let Some(dir) = var("TWIN_SOURCE_DIR") {
            self.paths.source_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Get the configuration directory path (`TWIN_HOME` or `~/.twin`).
    pub fn config_dir() -> PathBuf {
        match std::env::var("TWIN_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs_home().join(".twin"),
        }
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.paths
            .agents_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("agents"))
    }

    pub fn context_dir(&self) -> PathBuf {
        self.paths
            .context_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("context"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.temperature < 0.0 || self.ollama.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "ollama.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let timeouts = [
            ("ollama.timeout_secs", self.ollama.timeout_secs),
            ("tools.shell_timeout_secs", self.tools.shell_timeout_secs),
            ("tools.fetch_timeout_secs", self.tools.fetch_timeout_secs),
            ("tools.search_timeout_secs", self.tools.search_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ValidationError(format!("{name} must be > 0")));
        }

        let hours = &self.mode.work_hours;
        if hours.start >= hours.end || hours.end > 24 {
            return Err(ConfigError::ValidationError(
                "mode.work_hours must satisfy start < end <= 24".into(),
            ));
        }
        if hours.days.iter().any(|d| *d > 6) {
            return Err(ConfigError::ValidationError(
                "mode.work_hours.days must be in 0..=6 (0 = Monday)".into(),
            ));
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError("default_model must not be empty".into()));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_mode: None,
            models: default_models(),
            ollama: OllamaConfig::default(),
            tools: ToolsConfig::default(),
            mode: ModeConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Get the user's home directory.
pub fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.shell_timeout_secs, 30);
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
        assert_eq!(config.ollama.transport, Transport::Http);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.models, config.models);
        assert_eq!(parsed.mode.work_hours, config.mode.work_hours);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.ollama.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_work_hours_rejected() {
        let mut config = AppConfig::default();
        config.mode.work_hours.start = 18;
        config.mode.work_hours.end = 9;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.mode.work_hours.days = vec![7];
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.default_model, "qwen2.5-coder:7b");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "smart"

[tools]
shell_timeout_secs = 10
fetch_proxy_url = "http://127.0.0.1:8765"

[mode]
work_emails = ["@acme.com"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "smart");
        assert_eq!(config.models["smart"], "qwen2.5-coder:32b");
        assert_eq!(config.tools.shell_timeout_secs, 10);
        assert_eq!(config.tools.fetch_proxy_url.as_deref(), Some("http://127.0.0.1:8765"));
        assert_eq!(config.mode.work_emails, vec!["@acme.com".to_string()]);
        assert_eq!(config.mode.work_hours.start, 9);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for (section, key) in [
            ("ollama", "timeout_secs"),
            ("tools", "shell_timeout_secs"),
            ("tools", "fetch_timeout_secs"),
            ("tools", "search_timeout_secs"),
        ] {
            std::fs::write(&path, format!("[{section}]\n{key} = 0\n")).unwrap();
            match AppConfig::load_from(&path) {
                Err(ConfigError::ValidationError(msg)) => {
                    assert_eq!(msg, format!("{section}.{key} must be > 0"))
                }
                other => panic!("{section}.{key}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TWIN_MODEL", "llama3:8b"),
            ("TWIN_MODE", "work"),
            ("TWIN_OLLAMA_URL", "http://gpu-box:11434"),
            ("TWIN_SOURCE_DIR", "/src/twin"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_model, "llama3:8b");
        assert_eq!(config.default_mode, Some(Mode::Work));
        assert_eq!(config.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(config.paths.source_dir, Some(PathBuf::from("/src/twin")));
    }

    #[test]
    fn bad_mode_env_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| (k == "TWIN_MODE").then(|| "holiday".into()));
        assert!(result.is_err());
    }

    #[test]
    fn local_settings_lock_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".twin")).unwrap();
        std::fs::write(
            dir.path().join(LocalSettings::RELATIVE_PATH),
            "mode = \"work\"\nagent = \"technical-lead\"\n",
        )
        .unwrap();
        let settings = LocalSettings::load(dir.path()).unwrap();
        assert_eq!(settings.mode, Some(Mode::Work));
        assert_eq!(settings.agent.as_deref(), Some("technical-lead"));
    }

    #[test]
    fn missing_local_settings_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(LocalSettings::load(dir.path()).unwrap(), LocalSettings::default());
    }
}
