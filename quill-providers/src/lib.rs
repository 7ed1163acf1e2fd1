//! Completion provider interface and vendor clients for the Quill bot.
//!
//! One [`CompletionProvider`] trait covers both synchronous chat
//! completions and the asynchronous run protocol; vendor variants live
//! behind it and are selected by configuration.

pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use provider::CompletionProvider;
pub use types::{
    ChatMessage, CompletionRequest, CompletionResponse, FileRef, RunStatus, RunTranscript,
};

use quill_common::config::ProviderConfig;
use std::sync::Arc;

/// Build a provider from configuration.
pub fn build_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match config.kind.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            config.api_key.clone(),
            config.base_url.clone(),
        ))),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            config.api_key.clone(),
            config.base_url.clone(),
        ))),
        other => anyhow::bail!("unknown provider kind: {other}"),
    }
}
