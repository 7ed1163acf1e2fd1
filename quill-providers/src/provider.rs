//! Provider trait for completion backends.

use crate::types::{CompletionRequest, CompletionResponse, RunStatus, RunTranscript};
use async_trait::async_trait;

/// Completion provider trait.
///
/// Implementations handle authentication, request formatting, and
/// response parsing for a specific vendor API. The async run protocol
/// (create/status/messages) is optional; vendors without it return an
/// error from those methods and sessions fall back to direct
/// completions.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic").
    fn name(&self) -> &'static str;

    /// Issue a synchronous completion request.
    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<CompletionResponse>;

    /// Submit a long-running assistant job. Returns the run id.
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: &str,
    ) -> anyhow::Result<String>;

    /// Fetch the current status of a run.
    async fn run_status(&self, thread_id: &str, run_id: &str) -> anyhow::Result<RunStatus>;

    /// Fetch the full message transcript and file refs for a thread.
    async fn list_run_messages(&self, thread_id: &str) -> anyhow::Result<RunTranscript>;

    /// Download the raw bytes of a file produced by a run.
    async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("provider does not support file downloads (file {file_id})")
    }

    /// Whether this provider implements the async run protocol.
    fn supports_runs(&self) -> bool {
        false
    }
}
