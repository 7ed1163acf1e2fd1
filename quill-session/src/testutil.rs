//! Shared test doubles for the session crate.

use crate::platform::Outbound;
use async_trait::async_trait;
use quill_providers::provider::CompletionProvider;
use quill_providers::types::{
    CompletionRequest, CompletionResponse, RunStatus, RunTranscript,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

/// One message captured by [`RecordingOutbound`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
    pub files: Vec<PathBuf>,
}

/// Outbound implementation that records every send and edit.
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<String>>,
}

impl RecordingOutbound {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.edits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            files: Vec::new(),
        });
        Ok(())
    }

    async fn send_with_files(
        &self,
        channel_id: &str,
        text: &str,
        files: &[PathBuf],
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            files: files.to_vec(),
        });
        Ok(())
    }

    async fn edit_last(&self, _channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Scripted provider: completions and run statuses are popped from
/// queues loaded by the test.
#[derive(Default)]
pub struct MockProvider {
    pub completions: Mutex<VecDeque<anyhow::Result<CompletionResponse>>>,
    pub statuses: Mutex<VecDeque<RunStatus>>,
    pub transcript: Mutex<RunTranscript>,
    pub completion_requests: Mutex<Vec<CompletionRequest>>,
    pub created_runs: Mutex<Vec<(String, String)>>,
    pub files: Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl MockProvider {
    pub fn with_completions(replies: Vec<anyhow::Result<CompletionResponse>>) -> Self {
        Self {
            completions: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn with_statuses(statuses: Vec<RunStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    pub fn reply(text: &str) -> anyhow::Result<CompletionResponse> {
        Ok(CompletionResponse {
            content: text.to_string(),
            tool_calls: Vec::new(),
        })
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<CompletionResponse> {
        self.completion_requests.lock().unwrap().push(request);
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| anyhow::bail!("no scripted completion"))
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        _instructions: &str,
    ) -> anyhow::Result<String> {
        self.created_runs
            .lock()
            .unwrap()
            .push((thread_id.to_string(), assistant_id.to_string()));
        Ok("run-1".to_string())
    }

    async fn run_status(&self, _thread_id: &str, _run_id: &str) -> anyhow::Result<RunStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::Completed))
    }

    async fn list_run_messages(&self, _thread_id: &str) -> anyhow::Result<RunTranscript> {
        Ok(self.transcript.lock().unwrap().clone())
    }

    async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown file {file_id}"))
    }

    fn supports_runs(&self) -> bool {
        true
    }
}
