//! Hand-off from a planning session to Aider.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, warn};
use twin_agent::SessionContext;
use twin_core::{Error, Result};

/// Discussion kept in the planning summary.
const SUMMARY_CHARS: usize = 1000;

/// `aider --model=ollama/<model> [files…] --read <summary>`
pub fn command_args(model: &str, files: &[String], summary: &str) -> Vec<String> {
    let mut args = vec![format!("--model=ollama/{model}")];
    args.extend(files.iter().cloned());
    args.push("--read".into());
    args.push(summary.to_string());
    args
}

fn summary_path(session: &SessionContext) -> PathBuf {
    std::env::temp_dir().join(format!("twin-plan-{}.md", session.id()))
}

/// Write the planning summary, run Aider in the foreground, then clean up.
pub async fn hand_off(session: &SessionContext, files: &[String]) -> Result<()> {
    let path = summary_path(session);
    std::fs::write(&path, session.planning_summary(SUMMARY_CHARS))?;
    println!("  Planning summary saved to: {}", path.display());

    let args = command_args(session.model(), files, &path.to_string_lossy());
    println!("  Launching Aider: aider {}\n", args.join(" "));
    debug!(?args, "Starting aider");

    let status = Command::new("aider").args(&args).status().await;
    if let Err(e) = std::fs::remove_file(&path) {
        warn!("Could not remove {}: {e}", path.display());
    }
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(Error::Internal(format!("Aider exited with {status}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Internal(
            "aider not found; install it with `pip install aider-chat`".into(),
        )),
        Err(e) => Err(e.into()),
    }
}
