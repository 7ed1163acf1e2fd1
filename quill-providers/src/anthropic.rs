//! Anthropic-style completion provider.
//!
//! Chat completions via the messages API. The vendor has no
//! assistant-run API, so the run methods return errors and sessions
//! bound to this provider stay in direct-completion mode.

use crate::provider::CompletionProvider;
use crate::types::{CompletionRequest, CompletionResponse, RunStatus, RunTranscript};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anthropic API client.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<CompletionResponse> {
        // The messages API takes the system prompt as a top-level field,
        // not as a conversation message.
        let system: Vec<String> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.clone())
            .collect();
        let messages: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.join("\n\n"));
        }
        if request.response_format.is_some() {
            // No native JSON mode; steer via the system field instead.
            let hint = "Respond with a single valid JSON object and nothing else.";
            let combined = match body.get("system").and_then(|s| s.as_str()) {
                Some(existing) => format!("{existing}\n\n{hint}"),
                None => hint.to_string(),
            };
            body["system"] = serde_json::Value::String(combined);
        }

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error ({status}): {body}");
        }

        let parsed: MessagesResponse = resp.json().await?;
        let content = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CompletionResponse {
            content,
            tool_calls: Vec::new(),
        })
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
        _instructions: &str,
    ) -> anyhow::Result<String> {
        anyhow::bail!("anthropic provider does not support assistant runs")
    }

    async fn run_status(&self, _thread_id: &str, _run_id: &str) -> anyhow::Result<RunStatus> {
        anyhow::bail!("anthropic provider does not support assistant runs")
    }

    async fn list_run_messages(&self, _thread_id: &str) -> anyhow::Result<RunTranscript> {
        anyhow::bail!("anthropic provider does not support assistant runs")
    }
}
