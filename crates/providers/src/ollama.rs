//! Ollama HTTP client.
//!
//! Talks to a local Ollama server through its native API:
//! - `POST /api/generate` with `stream: false` for completions
//! - `GET /api/tags` for model listing and health checks

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use twin_core::error::ProviderError;
use twin_core::provider::{Completion, CompletionRequest, Provider};

/// A local Ollama server reached over HTTP.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(num_ctx) = request.num_ctx {
            options["num_ctx"] = serde_json::json!(num_ctx);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::json!(system);
        }
        body
    }

    fn send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(format!("no response within {}s", self.timeout.as_secs()))
        } else if e.is_connect() {
            ProviderError::Unavailable(format!(
                "cannot reach Ollama at {} (is `ollama serve` running?)",
                self.base_url
            ))
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::request_body(&request);

        debug!(model = %request.model, prompt_chars = request.prompt.len(), "Sending generate request");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status().as_u16();

        if status == 404 {
            return Err(ProviderError::ModelNotFound(format!(
                "{} (try `ollama pull {}`)",
                request.model, request.model
            )));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            let message = serde_json::from_str::<ApiError>(&error_body)
                .map(|e| e.error)
                .unwrap_or(error_body);
            return Err(ProviderError::ApiError {
                status_code: status,
                message,
            });
        }

        let api_response: GenerateResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let elapsed = started.elapsed();
        debug!(elapsed_ms = elapsed.as_millis() as u64, chars = api_response.response.len(), "Generate finished");

        Ok(Completion {
            text: api_response.response.trim().to_string(),
            model: api_response.model.unwrap_or(request.model),
            elapsed,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: "model listing failed".into(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.list_models().await.map(|_| ())
    }
}

// --- Ollama API types ---

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_answering(
        verb: &str,
        route: &str,
        status: u16,
        body: serde_json::Value,
    ) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn request_body_shape() {
        let req = CompletionRequest::new("qwen2.5-coder:7b", "hello")
            .with_system("be brief")
            .with_num_ctx(Some(4096));
        let body = OllamaProvider::request_body(&req);
        assert_eq!(body["stream"], false);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["options"]["num_ctx"], 4096);
    }

    #[test]
    fn request_body_without_system() {
        let body = OllamaProvider::request_body(&CompletionRequest::new("m", "p"));
        assert!(body.get("system").is_none());
        assert!(body["options"].get("num_ctx").is_none());
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = OllamaProvider::new("http://localhost:11434/", Duration::from_secs(5));
        assert_eq!(p.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn complete_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": false, "system": "sys", "prompt": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "qwen2.5-coder:7b",
                "response": "  Hi there.\n",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(server.uri(), Duration::from_secs(5));
        let completion = provider
            .complete(CompletionRequest::new("qwen2.5-coder:7b", "hello").with_system("sys"))
            .await
            .unwrap();
        assert_eq!(completion.text, "Hi there.");
        assert_eq!(completion.model, "qwen2.5-coder:7b");
    }

    #[tokio::test]
    async fn missing_model_maps_to_model_not_found() {
        let server = server_answering(
            "POST",
            "/api/generate",
            404,
            json!({"error": "model 'nope' not found"}),
        )
        .await;
        let provider = OllamaProvider::new(server.uri(), Duration::from_secs(5));
        let err = provider
            .complete(CompletionRequest::new("nope", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(m) if m.contains("nope")));
    }

    #[tokio::test]
    async fn server_error_carries_message() {
        let server =
            server_answering("POST", "/api/generate", 500, json!({"error": "out of memory"})).await;
        let provider = OllamaProvider::new(server.uri(), Duration::from_secs(5));
        let err = provider
            .complete(CompletionRequest::new("m", "hi"))
            .await
            .unwrap_err();
        match err {
            ProviderError::ApiError { status_code, message } => {
                assert_eq!(status_code, 500);
                assert_eq!(message, "out of memory");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_port_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = OllamaProvider::new(format!("http://{addr}"), Duration::from_secs(5));
        let err = provider.health_check().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn list_models_reads_tags() {
        let server = server_answering(
            "GET",
            "/api/tags",
            200,
            json!({"models": [
                {"name": "qwen2.5-coder:7b", "size": 1},
                {"name": "llava:7b", "size": 2}
            ]}),
        )
        .await;
        let provider = OllamaProvider::new(server.uri(), Duration::from_secs(5));
        let models = provider.list_models().await.unwrap();
        assert_eq!(models, vec!["qwen2.5-coder:7b", "llava:7b"]);
    }
}
