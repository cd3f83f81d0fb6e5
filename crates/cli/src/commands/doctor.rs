//! `twin doctor`: diagnose the local setup.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use twin_config::{AppConfig, Transport};
use twin_core::Provider;
use twin_tools::self_patch::{GitCli, VersionControl};

/// First line of `<bin> --version`, if the binary runs.
async fn version_of(bin: &str) -> Option<String> {
    let output = Command::new(bin)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(Duration::from_secs(5), output).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 twin doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = match AppConfig::load() {
        Ok(config) => {
            if config_path.exists() {
                println!("  ✅ Config file valid: {}", config_path.display());
            } else {
                println!("  ℹ️  No config file, using defaults ({})", config_path.display());
            }
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            return Err(e.into());
        }
    };

    let provider = twin_providers::build_from_config(&config);
    let transport = match config.ollama.transport {
        Transport::Http => config.ollama.base_url.as_str(),
        Transport::Cli => "ollama CLI",
    };
    let server_ok = match provider.health_check().await {
        Ok(()) => {
            println!("  ✅ Ollama reachable ({transport})");
            true
        }
        Err(e) => {
            println!("  ❌ Ollama unreachable ({transport}): {e}");
            println!("     Start it with `ollama serve`");
            issues += 1;
            false
        }
    };

    if server_ok {
        let model = twin_providers::resolve_model(&config.default_model, &config.models);
        match provider.list_models().await {
            Ok(models) if models.iter().any(|m| m == &model) => {
                println!("  ✅ Default model installed: {model}");
            }
            Ok(_) => {
                println!("  ⚠️  Default model not installed: run `ollama pull {model}`");
                issues += 1;
            }
            Err(e) => {
                println!("  ⚠️  Could not list models: {e}");
                issues += 1;
            }
        }
    }

    let agents_dir = config.agents_dir();
    let agents = twin_agent::AgentCatalog::load(&agents_dir);
    if agents.is_empty() {
        println!("  ℹ️  No agents in {}; the built-in assistant is used", agents_dir.display());
    } else {
        println!("  ✅ {} agent(s): {}", agents.names().len(), agents.names().join(", "));
    }

    println!("  ✅ History directory: {}", config.context_dir().display());

    match version_of("git").await {
        Some(v) => println!("  ✅ {v}"),
        None => {
            println!("  ⚠️  git not found (needed for mode detection and improve_self)");
            issues += 1;
        }
    }
    match version_of("aider").await {
        Some(v) => println!("  ✅ aider {v}"),
        None => println!("  ℹ️  aider not found; /edit is unavailable"),
    }

    match &config.paths.source_dir {
        Some(source) => match GitCli::new(source).changed_paths().await {
            Ok(changed) if changed.is_empty() => {
                println!("  ✅ improve_self enabled on {}", source.display());
            }
            Ok(changed) => println!(
                "  ⚠️  improve_self source tree has {} uncommitted change(s); patches will be refused",
                changed.len()
            ),
            Err(e) => {
                println!("  ❌ improve_self source_dir unusable: {e}");
                issues += 1;
            }
        },
        None => println!("  ℹ️  improve_self disabled (no source_dir)"),
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    if !server_ok {
        return Err("model server unreachable".into());
    }
    Ok(())
}
