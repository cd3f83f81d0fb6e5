//! `web_fetch`: fetch a URL as readable text.
//!
//! When a text-cleaning proxy is configured it is asked first
//! (`GET {proxy}/fetch?url=...`). Any proxy failure falls back to a direct
//! request whose HTML is converted in-process.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use twin_core::error::ToolError;
use twin_core::tool::{Tool, ToolOutput};

use crate::args;
use crate::html;

pub struct WebFetchTool {
    client: reqwest::Client,
    proxy_url: Option<String>,
    max_content_chars: usize,
    timeout: Duration,
}

/// Response body of the proxy's `/fetch` endpoint.
#[derive(Debug, Deserialize)]
pub struct ProxyResponse {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    pub status_code: u16,
    #[serde(default)]
    pub elapsed_seconds: f64,
}

struct Page {
    url: String,
    title: Option<String>,
    text: String,
    status_code: u16,
    source: &'static str,
}

impl WebFetchTool {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            proxy_url: None,
            max_content_chars: 25_000,
            timeout,
        }
    }

    pub fn with_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.proxy_url = proxy_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    pub fn with_max_content_chars(mut self, max: usize) -> Self {
        self.max_content_chars = max;
        self
    }

    async fn via_proxy(&self, proxy: &str, url: &str) -> Result<Page, String> {
        let endpoint = format!("{proxy}/fetch?url={}", urlencoding::encode(url));
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("proxy returned HTTP {}", response.status().as_u16()));
        }
        let body: ProxyResponse = response.json().await.map_err(|e| e.to_string())?;
        debug!(url = %body.url, elapsed = body.elapsed_seconds, "Fetched via proxy");
        Ok(Page {
            url: body.url,
            title: body.title,
            text: body.text,
            status_code: body.status_code,
            source: "proxy",
        })
    }

    async fn direct(&self, url: &str) -> Result<Page, ToolError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: "web_fetch".into(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ToolError::Unavailable(format!("Failed to fetch {url}: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(ToolError::Unavailable(format!("HTTP {status} from {url}")));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Unavailable(format!("Failed to read body of {url}: {e}")))?;

        let looks_like_html = is_html || body.trim_start().starts_with('<');
        let (title, text) = if looks_like_html {
            (html::extract_title(&body), html::to_text(&body))
        } else {
            (None, body)
        };

        Ok(Page {
            url: final_url,
            title,
            text,
            status_code: status,
            source: "direct",
        })
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text (title, then content)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The http(s) URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let url = args::required_str(arguments, "url")?.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!(
                "'{url}' is not an http(s) URL"
            )));
        }

        let mut page = None;
        if let Some(proxy) = &self.proxy_url {
            match self.via_proxy(proxy, url).await {
                Ok(p) => page = Some(p),
                Err(reason) => warn!(proxy = %proxy, "Fetch proxy failed, fetching directly: {reason}"),
            }
        }
        let page = match page {
            Some(p) => p,
            None => self.direct(url).await?,
        };

        let text = html::truncate(&page.text, self.max_content_chars);
        let mut output = String::new();
        if let Some(title) = &page.title {
            output.push_str(&format!("Title: {title}\n"));
        }
        output.push_str(&format!("URL: {}\n\n{text}", page.url));

        Ok(ToolOutput::text(output).with_data(serde_json::json!({
            "url": page.url,
            "title": page.title,
            "length": text.chars().count(),
            "status_code": page.status_code,
            "source": page.source,
        })))
    }
}
