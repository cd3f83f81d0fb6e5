//! `ollama run` subprocess client.
//!
//! For machines where only the Ollama binary is usable. The CLI has no
//! system-prompt flag, so the system prompt is folded into the prompt text.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use twin_core::error::ProviderError;
use twin_core::provider::{Completion, CompletionRequest, Provider};

pub struct OllamaCliProvider {
    binary: PathBuf,
    timeout: Duration,
}

impl OllamaCliProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: PathBuf::from("ollama"),
            timeout,
        }
    }

    /// Use a specific executable instead of `ollama` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Fold the system prompt into the single prompt argument.
    pub fn full_prompt(request: &CompletionRequest) -> String {
        match &request.system {
            Some(system) => format!(
                "{system}\n\n---\n\nUser: {}\n\nAssistant:",
                request.prompt
            ),
            None => request.prompt.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, ProviderError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.output();
        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProviderError::Unavailable(format!(
                    "'{}' not found; is Ollama installed?",
                    self.binary.display()
                )))
            }
            Ok(Err(e)) => Err(ProviderError::Unavailable(e.to_string())),
            Err(_) => Err(ProviderError::Timeout(format!(
                "ollama did not answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Provider for OllamaCliProvider {
    fn name(&self) -> &str {
        "ollama-cli"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let prompt = Self::full_prompt(&request);
        debug!(model = %request.model, prompt_chars = prompt.len(), "Running ollama");
        let started = Instant::now();

        let output = self.run(&["run", &request.model, &prompt]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(code = ?output.status.code(), stderr = %stderr, "ollama run failed");
            if stderr.contains("not found") {
                return Err(ProviderError::ModelNotFound(request.model));
            }
            return Err(ProviderError::ApiError {
                status_code: 0,
                message: stderr,
            });
        }

        Ok(Completion {
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            model: request.model,
            elapsed: started.elapsed(),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let output = self.run(&["list"]).await?;
        if !output.status.success() {
            return Err(ProviderError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.list_models().await.map(|_| ())
    }
}

/// First column of `ollama list`, header skipped.
fn parse_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_prepended() {
        let req = CompletionRequest::new("m", "what time is it?").with_system("You are twin.");
        assert_eq!(
            OllamaCliProvider::full_prompt(&req),
            "You are twin.\n\n---\n\nUser: what time is it?\n\nAssistant:"
        );
    }

    #[test]
    fn bare_prompt_passes_through() {
        let req = CompletionRequest::new("m", "hi");
        assert_eq!(OllamaCliProvider::full_prompt(&req), "hi");
    }

    #[test]
    fn list_output_parsing() {
        let out = "NAME                ID              SIZE      MODIFIED\n\
                   qwen2.5-coder:7b    2b0496514337    4.7 GB    2 days ago\n\
                   llava:7b            8dd30f6b0cb1    4.7 GB    3 weeks ago\n";
        assert_eq!(parse_list(out), vec!["qwen2.5-coder:7b", "llava:7b"]);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let provider = OllamaCliProvider::new(Duration::from_secs(5))
            .with_binary("/nonexistent/ollama-binary");
        let err = provider
            .complete(CompletionRequest::new("m", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_fake_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ollama");
        std::fs::write(&script, "#!/bin/sh\necho \"model=$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = OllamaCliProvider::new(Duration::from_secs(5)).with_binary(&script);
        let completion = provider
            .complete(CompletionRequest::new("qwen2.5-coder:7b", "hi"))
            .await
            .unwrap();
        assert_eq!(completion.text, "model=qwen2.5-coder:7b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn model_not_found_from_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ollama");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"Error: model '$2' not found\" >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = OllamaCliProvider::new(Duration::from_secs(5)).with_binary(&script);
        let err = provider
            .complete(CompletionRequest::new("ghost", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(m) if m == "ghost"));
    }
}
