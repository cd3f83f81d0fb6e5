//! `twin history`: the session log for the current directory.

use twin_agent::HistoryStore;
use twin_config::AppConfig;

pub fn run(clear: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;
    let store = HistoryStore::new(config.context_dir());

    if clear {
        if store.clear(&cwd)? {
            println!("  ✓ Cleared {}", store.path_for(&cwd).display());
        } else {
            println!("  No history for {}", cwd.display());
        }
        return Ok(());
    }

    for line in store.summary(&cwd)?.lines() {
        println!("  {line}");
    }
    let sessions = store.recent_sessions(&cwd, 5)?;
    if !sessions.is_empty() {
        println!();
    }
    for entry in sessions.iter().rev() {
        println!(
            "  {}  {}  [{}]  {}",
            entry.timestamp,
            entry.session_id.as_deref().unwrap_or("--------"),
            entry.mode,
            entry.topic().unwrap_or_default()
        );
    }
    println!("\n  File: {}", store.path_for(&cwd).display());
    Ok(())
}
