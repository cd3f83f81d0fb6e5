//! Provider selection: builds the configured transport and resolves
//! model aliases.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use twin_config::{AppConfig, Transport};
use twin_core::provider::Provider;

use crate::ollama::OllamaProvider;
use crate::ollama_cli::OllamaCliProvider;

/// Build the provider named by `config.ollama.transport`.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let timeout = Duration::from_secs(config.ollama.timeout_secs);
    match config.ollama.transport {
        Transport::Http => {
            let provider = OllamaProvider::new(&config.ollama.base_url, timeout);
            debug!(base_url = %provider.base_url(), "Using Ollama over HTTP");
            Arc::new(provider)
        }
        Transport::Cli => Arc::new(OllamaCliProvider::new(timeout)),
    }
}

/// Map an alias such as `fast` to a concrete model tag.
///
/// Names that aren't aliases pass through unchanged.
pub fn resolve_model(name: &str, aliases: &BTreeMap<String, String>) -> String {
    let name = name.trim();
    aliases
        .get(name)
        .cloned()
        .unwrap_or_else(|| name.to_string())
}
