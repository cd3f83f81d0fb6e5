//! `web_search`: DuckDuckGo search through its HTML endpoint.
//!
//! No API key needed. Results are scraped from the `result__a` (title and
//! link) and `result__snippet` anchors of the response page.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::html;

const DEFAULT_MAX_RESULTS: usize = 5;

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

/// DuckDuckGo wraps result links in a redirect (`/l/?uddg=<encoded>`).
fn unwrap_redirect(href: &str) -> String {
    let href = html::decode_entities(href);
    if let Some(query) = href.split_once('?').map(|(_, q)| q) {
        for pair in query.split('&') {
            if let Some(target) = pair.strip_prefix("uddg=")
                && let Ok(decoded) = urlencoding::decode(target)
            {
                return decoded.into_owned();
            }
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    href
}

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<a\b([^>]*)>(.*?)</a>"#).expect("anchor pattern is valid"));
static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href="([^"]*)""#).expect("href pattern is valid"));

/// Pull results out of a DuckDuckGo HTML page, in page order.
pub fn parse_results(page: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::new();
    for caps in ANCHOR.captures_iter(page) {
        let attrs = &caps[1];
        let inner = html::to_text(&caps[2]).split_whitespace().collect::<Vec<_>>().join(" ");
        if attrs.contains("result__a") {
            if results.len() >= max_results {
                break;
            }
            let url = HREF
                .captures(attrs)
                .map(|h| unwrap_redirect(&h[1]))
                .unwrap_or_default();
            results.push(SearchResult {
                title: inner,
                url,
                snippet: String::new(),
            });
        } else if attrs.contains("result__snippet")
            && let Some(last) = results.last_mut()
            && last.snippet.is_empty()
        {
            last.snippet = inner;
        }
    }
    results
}

fn render(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut entry = format!("{}. {}\n   {}", i + 1, r.title, r.url);
            if !r.snippet.is_empty() {
                entry.push_str(&format!("\n   {}", r.snippet));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (DuckDuckGo). Returns titles, URLs and snippets."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (optional, default 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let query = args::required_str(arguments, "query")?.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }
        let max_results = args::optional_u64(arguments, "max_results")?
            .map(|m| (m as usize).clamp(1, 25))
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        debug!(query = %query, "Searching the web");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: "web_search".into(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ToolError::Unavailable(format!("Search request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Unavailable(format!(
                "Search endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        let page = response
            .text()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Failed to read search results: {e}")))?;

        let results = parse_results(&page, max_results);
        let data = serde_json::json!({
            "count": results.len(),
            "query": query,
            "results": results,
        });

        if results.is_empty() {
            return Ok(ToolOutput::text(format!("No results found for '{query}'")).with_data(data));
        }
        Ok(ToolOutput::text(render(&results)).with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::{closed_port_url, serving};
    use serde_json::json;
    use twin_core::error::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fqwenlm.github.io%2Fblog%2Fqwen2.5-coder%2F&amp;rut=abc">Qwen2.5-<b>Coder</b> Series</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Open <b>code</b> models &amp; more.</a>
</div>
<div class="result results_links">
  <a rel="nofollow" class="result__a" href="https://ollama.com/library/qwen2.5-coder">qwen2.5-coder</a>
</div>
<div class="result results_links">
  <a rel="nofollow" class="result__a" href="https://example.com/third">Third</a>
</div>
"#;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_titles_links_and_snippets() {
        let results = parse_results(PAGE, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Qwen2.5-Coder Series");
        assert_eq!(results[0].url, "https://qwenlm.github.io/blog/qwen2.5-coder/");
        assert_eq!(results[0].snippet, "Open code models & more.");
        assert_eq!(results[1].url, "https://ollama.com/library/qwen2.5-coder");
        assert!(results[1].snippet.is_empty());
    }

    #[test]
    fn respects_max_results() {
        assert_eq!(parse_results(PAGE, 2).len(), 2);
    }

    #[tokio::test]
    async fn search_renders_numbered_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "qwen coder"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
            .expect(1)
            .mount(&server)
            .await;
        let tool =
            WebSearchTool::new(format!("{}/html/", server.uri()), Duration::from_secs(5), "twin-test");
        let out = tool
            .execute(&map(json!({"query": "qwen coder", "max_results": 2})))
            .await
            .unwrap();
        assert!(out.output.starts_with("1. Qwen2.5-Coder Series\n   https://qwenlm.github.io/"));
        assert!(out.output.contains("2. qwen2.5-coder"));
        assert!(!out.output.contains("3. Third"));
    }

    #[tokio::test]
    async fn empty_page_is_no_results() {
        let server = serving("/html/", 200, "text/html", "<html></html>").await;
        let tool =
            WebSearchTool::new(format!("{}/html/", server.uri()), Duration::from_secs(5), "twin-test");
        let out = tool.execute(&map(json!({"query": "zzzz"}))).await.unwrap();
        assert_eq!(out.output, "No results found for 'zzzz'");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let tool = WebSearchTool::new(closed_port_url(), Duration::from_secs(5), "twin-test");
        let err = tool.execute(&map(json!({"query": "rust"}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
