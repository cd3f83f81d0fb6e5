//! Work / personal mode detection.
//!
//! Signals are consulted in priority order and the first one that decides
//! wins: explicit flag, per-repo lock file, configured default, directory
//! patterns, git `user.email`, work hours. With no signal the mode is
//! personal.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Timelike};
use tokio::process::Command;
use tracing::{debug, warn};
use twin_config::{AppConfig, LocalSettings, ModeConfig};
use twin_core::Mode;

/// Which signal decided the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Flag,
    Config,
    RepoLock,
    Directory,
    GitEmail,
    WorkHours,
    Default,
}

impl std::fmt::Display for ModeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Flag => "command-line flag",
            Self::Config => "config default_mode",
            Self::RepoLock => "repository lock",
            Self::Directory => "directory pattern",
            Self::GitEmail => "git user.email",
            Self::WorkHours => "work hours",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub mode: Mode,
    pub source: ModeSource,
}

impl Detection {
    fn new(mode: Mode, source: ModeSource) -> Self {
        Self { mode, source }
    }
}

/// Everything the ladder looks at, gathered up front.
#[derive(Debug, Clone)]
pub struct ModeSignals<'a> {
    pub flag: Option<Mode>,
    pub configured: Option<Mode>,
    pub repo_lock: Option<Mode>,
    pub cwd: &'a Path,
    pub git_email: Option<String>,
    pub now: DateTime<Local>,
}

/// Run the priority ladder over already-collected signals.
pub fn detect_with(config: &ModeConfig, signals: &ModeSignals<'_>) -> Detection {
    if let Some(mode) = signals.flag {
        return Detection::new(mode, ModeSource::Flag);
    }
    if let Some(mode) = signals.repo_lock {
        return Detection::new(mode, ModeSource::RepoLock);
    }
    if let Some(mode) = signals.configured {
        return Detection::new(mode, ModeSource::Config);
    }
    if let Some(mode) = directory_mode(config, signals.cwd) {
        return Detection::new(mode, ModeSource::Directory);
    }
    // Any readable email that isn't a work email means personal.
    if let Some(email) = &signals.git_email {
        let mode = if config.work_emails.iter().any(|w| email.contains(w.as_str())) {
            Mode::Work
        } else {
            Mode::Personal
        };
        return Detection::new(mode, ModeSource::GitEmail);
    }
    if is_work_hours(config, signals.now) {
        return Detection::new(Mode::Work, ModeSource::WorkHours);
    }
    Detection::new(Mode::Personal, ModeSource::Default)
}

fn directory_mode(config: &ModeConfig, cwd: &Path) -> Option<Mode> {
    let cwd = cwd.to_string_lossy();
    if config.work_patterns.iter().any(|p| cwd.contains(p.as_str())) {
        return Some(Mode::Work);
    }
    if config.personal_patterns.iter().any(|p| cwd.contains(p.as_str())) {
        return Some(Mode::Personal);
    }
    None
}

/// Days are numbered from Monday = 0; `end` is exclusive.
pub fn is_work_hours(config: &ModeConfig, now: DateTime<Local>) -> bool {
    let hours = &config.work_hours;
    let weekday = now.weekday().num_days_from_monday() as u8;
    if !hours.days.contains(&weekday) {
        return false;
    }
    let hour = now.hour() as u8;
    hours.start <= hour && hour < hours.end
}

/// `git config user.email` run in `cwd`, if git answers within two seconds.
pub async fn git_email(cwd: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["config", "user.email"])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(Duration::from_secs(2), output).await {
        Ok(Ok(out)) if out.status.success() => {
            let email = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!email.is_empty()).then_some(email)
        }
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            debug!(error = %e, "git unavailable for mode detection");
            None
        }
        Err(_) => {
            debug!("git config timed out during mode detection");
            None
        }
    }
}

/// Gather every signal for `cwd` and run the ladder.
pub async fn detect(config: &AppConfig, flag: Option<Mode>, cwd: &Path) -> Detection {
    let repo_lock = match LocalSettings::load(cwd) {
        Ok(settings) => settings.mode,
        Err(e) => {
            warn!("Ignoring repository settings: {e}");
            None
        }
    };
    // Only ask git when nothing above it decides.
    let undecided = flag.is_none()
        && config.default_mode.is_none()
        && repo_lock.is_none()
        && directory_mode(&config.mode, cwd).is_none();
    let git_email = if undecided { git_email(cwd).await } else { None };

    let signals = ModeSignals {
        flag,
        configured: config.default_mode,
        repo_lock,
        cwd,
        git_email,
        now: Local::now(),
    };
    let detection = detect_with(&config.mode, &signals);
    debug!(mode = %detection.mode, source = %detection.source, "Mode detected");
    detection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2026-03-11 is a Wednesday, 2026-03-14 a Saturday.
    fn at(day: u32, hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, day, hour, 30, 0).single().unwrap()
    }

    fn signals(cwd: &Path) -> ModeSignals<'_> {
        ModeSignals {
            flag: None,
            configured: None,
            repo_lock: None,
            cwd,
            git_email: None,
            now: at(14, 12),
        }
    }

    #[test]
    fn nothing_means_personal() {
        let d = detect_with(&ModeConfig::default(), &signals(Path::new("/tmp/x")));
        assert_eq!(d, Detection::new(Mode::Personal, ModeSource::Default));
    }

    #[test]
    fn flag_beats_everything() {
        let cwd = Path::new("/home/me/work/api");
        let mut s = signals(cwd);
        s.flag = Some(Mode::Personal);
        s.repo_lock = Some(Mode::Work);
        let d = detect_with(&ModeConfig::default(), &s);
        assert_eq!(d, Detection::new(Mode::Personal, ModeSource::Flag));
    }

    #[test]
    fn repo_lock_beats_directory() {
        let cwd = Path::new("/home/me/work/api");
        let mut s = signals(cwd);
        s.repo_lock = Some(Mode::Personal);
        assert_eq!(detect_with(&ModeConfig::default(), &s).source, ModeSource::RepoLock);
        s.repo_lock = None;
        assert_eq!(
            detect_with(&ModeConfig::default(), &s),
            Detection::new(Mode::Work, ModeSource::Directory)
        );
    }

    #[test]
    fn repo_lock_beats_configured_default() {
        let mut s = signals(Path::new("/tmp/x"));
        s.configured = Some(Mode::Personal);
        s.repo_lock = Some(Mode::Work);
        assert_eq!(
            detect_with(&ModeConfig::default(), &s),
            Detection::new(Mode::Work, ModeSource::RepoLock)
        );
        s.repo_lock = None;
        assert_eq!(
            detect_with(&ModeConfig::default(), &s),
            Detection::new(Mode::Personal, ModeSource::Config)
        );
    }

    #[test]
    fn personal_directory_pattern() {
        let d = detect_with(&ModeConfig::default(), &signals(Path::new("/home/me/personal/blog")));
        assert_eq!(d, Detection::new(Mode::Personal, ModeSource::Directory));
    }

    #[test]
    fn git_email_decides_before_hours() {
        let config = ModeConfig {
            work_emails: vec!["@acme.com".into()],
            ..ModeConfig::default()
        };
        let mut s = signals(Path::new("/tmp/x"));
        s.now = at(11, 10);
        s.git_email = Some("me@acme.com".into());
        assert_eq!(detect_with(&config, &s), Detection::new(Mode::Work, ModeSource::GitEmail));
        s.git_email = Some("me@home.net".into());
        assert_eq!(detect_with(&config, &s), Detection::new(Mode::Personal, ModeSource::GitEmail));
    }

    #[test]
    fn work_hours_window() {
        let config = ModeConfig::default();
        assert!(is_work_hours(&config, at(11, 9)));
        assert!(is_work_hours(&config, at(11, 17)));
        assert!(!is_work_hours(&config, at(11, 18)));
        assert!(!is_work_hours(&config, at(11, 8)));
        assert!(!is_work_hours(&config, at(14, 12)));

        let mut s = signals(Path::new("/tmp/x"));
        s.now = at(11, 10);
        assert_eq!(detect_with(&config, &s), Detection::new(Mode::Work, ModeSource::WorkHours));
    }

    #[tokio::test]
    async fn repo_lock_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".twin")).unwrap();
        std::fs::write(dir.path().join(LocalSettings::RELATIVE_PATH), "mode = \"work\"\n").unwrap();
        let d = detect(&AppConfig::default(), None, dir.path()).await;
        assert_eq!(d, Detection::new(Mode::Work, ModeSource::RepoLock));
    }
}
