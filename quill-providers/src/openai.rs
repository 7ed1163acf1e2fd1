//! OpenAI-style completion provider.
//!
//! Covers the chat completions API and the assistants run API
//! (threads/runs/messages).

use crate::provider::CompletionProvider;
use crate::types::{
    ChatMessage, CompletionRequest, CompletionResponse, FileRef, RunStatus, RunTranscript,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI API client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Surface a non-2xx response as an error carrying the body text.
    async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI API error ({status}): {body}")
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RunResponse {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct ThreadMessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<ThreadContentPart>,
}

#[derive(Deserialize)]
struct ThreadContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<ThreadText>,
    #[serde(default)]
    image_file: Option<ThreadImageFile>,
}

#[derive(Deserialize)]
struct ThreadText {
    value: String,
}

#[derive(Deserialize)]
struct ThreadImageFile {
    file_id: String,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<CompletionResponse> {
        let resp = self
            .client
            .post(self.url("/v1/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let parsed: ChatCompletionResponse = resp.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("completion response had no choices"))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls,
        })
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: &str,
    ) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "assistant_id": assistant_id,
            "instructions": instructions,
        });

        let resp = self
            .client
            .post(self.url(&format!("/v1/threads/{thread_id}/runs")))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .json(&body)
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let run: RunResponse = resp.json().await?;
        tracing::debug!(run_id = %run.id, status = %run.status, "Run created");
        Ok(run.id)
    }

    async fn run_status(&self, thread_id: &str, run_id: &str) -> anyhow::Result<RunStatus> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/threads/{thread_id}/runs/{run_id}")))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let run: RunResponse = resp.json().await?;
        RunStatus::parse(&run.status)
            .ok_or_else(|| anyhow::anyhow!("unknown run status: {}", run.status))
    }

    async fn list_run_messages(&self, thread_id: &str) -> anyhow::Result<RunTranscript> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/threads/{thread_id}/messages")))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .query(&[("order", "asc")])
            .send()
            .await?;
        let resp = Self::check(resp).await?;

        let list: ThreadMessageList = resp.json().await?;
        let mut transcript = RunTranscript::default();

        for message in list.data {
            let mut text = String::new();
            for part in message.content {
                match part.kind.as_str() {
                    "text" => {
                        if let Some(t) = part.text {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(&t.value);
                        }
                    }
                    "image_file" => {
                        if let Some(f) = part.image_file {
                            transcript.file_refs.push(FileRef {
                                id: f.file_id,
                                filename: None,
                            });
                        }
                    }
                    _ => {}
                }
            }
            transcript.turns.push(ChatMessage::new(message.role, text));
        }

        Ok(transcript)
    }

    async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/files/{file_id}/content")))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    fn supports_runs(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new("test-key".into(), Some(server.uri()))
    }

    #[tokio::test]
    async fn test_create_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hello there!"}}]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let request =
            CompletionRequest::new("gpt-4o", vec![ChatMessage::new("user", "Hello")]);
        let response = provider.create_completion(request).await.unwrap();

        assert_eq!(response.content, "Hello there!");
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_create_completion_error_surfaces_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let request = CompletionRequest::new("gpt-4o", vec![]);
        let err = provider.create_completion(request).await.unwrap_err();

        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_create_run_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/threads/thread_1/runs"))
            .and(header("OpenAI-Beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1", "status": "queued"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/runs/run_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1", "status": "in_progress"
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let run_id = provider
            .create_run("thread_1", "asst_1", "do the thing")
            .await
            .unwrap();
        assert_eq!(run_id, "run_1");

        let status = provider.run_status("thread_1", "run_1").await.unwrap();
        assert_eq!(status, RunStatus::InProgress);
    }

    #[tokio::test]
    async fn test_list_run_messages_collects_text_and_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/thread_1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"role": "user", "content": [
                        {"type": "text", "text": {"value": "analyze this"}}
                    ]},
                    {"role": "assistant", "content": [
                        {"type": "text", "text": {"value": "Here is the chart."}},
                        {"type": "image_file", "image_file": {"file_id": "file-42"}}
                    ]}
                ]
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let transcript = provider.list_run_messages("thread_1").await.unwrap();

        assert_eq!(transcript.turns.len(), 2);
        assert_eq!(transcript.turns[1].content, "Here is the chart.");
        assert_eq!(transcript.file_refs.len(), 1);
        assert_eq!(transcript.file_refs[0].id, "file-42");
    }

    #[tokio::test]
    async fn test_download_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/files/file-42/content"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let bytes = provider.download_file("file-42").await.unwrap();
        assert_eq!(bytes, b"PNGDATA");
    }

    #[tokio::test]
    async fn test_unknown_run_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/threads/t/runs/r"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "r", "status": "weird"
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        assert!(provider.run_status("t", "r").await.is_err());
    }
}
