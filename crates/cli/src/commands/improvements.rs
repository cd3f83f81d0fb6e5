//! `twin improvements`: recent entries from the self-improvement log.

use twin_config::AppConfig;
use twin_tools::self_patch::changelog::CHANGELOG_FILE;
use twin_tools::SelfPatcher;

pub fn run(count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    print_recent(&config, count);
    Ok(())
}

pub fn print_recent(config: &AppConfig, count: usize) {
    let Some(source) = &config.paths.source_dir else {
        println!("  Self-improvement is off. Set [paths] source_dir or TWIN_SOURCE_DIR to enable it.");
        return;
    };
    let titles = SelfPatcher::git(source).recent_improvements(count);
    if titles.is_empty() {
        println!("  No improvements recorded in {}", source.join(CHANGELOG_FILE).display());
        return;
    }
    println!("  Recent improvements (newest first):");
    for title in titles {
        println!("  - {title}");
    }
}
