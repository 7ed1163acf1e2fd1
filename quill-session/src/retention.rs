//! Retention manager.
//!
//! Runs at session teardown and decides what, if anything, of the
//! transcript survives into the bound profile. Failures here are logged
//! and swallowed: retention must never block or fail teardown.

use crate::dispatch;
use quill_profiles::profile::{Profile, Role, Turn};
use quill_profiles::store::ProfileStore;
use quill_providers::provider::CompletionProvider;
use quill_providers::types::{ChatMessage, CompletionRequest};
use std::sync::Arc;

/// Directive sent to the provider when condensing a transcript.
const CONDENSE_DIRECTIVE: &str = "Condense the following conversation into a short summary. \
Keep the facts, decisions, and open questions a future conversation would need; drop greetings \
and filler.";

/// Applies a profile's retention policy to a finished transcript.
pub struct RetentionManager {
    store: Arc<ProfileStore>,
    provider: Arc<dyn CompletionProvider>,
}

/// Drop system turns, strip control tokens, and keep the last `keep`
/// turns in order.
pub fn trim_turns(turns: &[Turn], keep: usize, tag: &str) -> Vec<Turn> {
    let mut kept: Vec<Turn> = turns
        .iter()
        .filter(|turn| turn.role != Role::System)
        .map(|turn| Turn {
            role: turn.role,
            content: dispatch::sanitize(&turn.content, tag),
            attachments: turn.attachments.clone(),
        })
        .collect();

    if kept.len() > keep {
        kept.drain(..kept.len() - keep);
    }
    kept
}

impl RetentionManager {
    pub fn new(store: Arc<ProfileStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { store, provider }
    }

    /// Apply the profile's retention policy. Never fails: persistence
    /// and condense errors are logged and teardown proceeds.
    pub async fn on_session_end(&self, profile: &Profile, transcript: &[Turn], tag: &str) {
        if !profile.retention {
            return;
        }

        if profile.retention_size == 0 {
            let summary = match self.condense(profile, transcript, tag).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(profile_id = %profile.id, error = %e, "Condense call failed");
                    String::new()
                }
            };
            if let Err(e) = self.store.save_condensed(&profile.id, &summary) {
                tracing::warn!(profile_id = %profile.id, error = %e, "Failed to persist condensed retention");
            }
            return;
        }

        let kept = trim_turns(transcript, profile.retention_size, tag);
        if let Err(e) = self.store.save_retention(&profile.id, &kept) {
            tracing::warn!(profile_id = %profile.id, error = %e, "Failed to persist retention turns");
        }
    }

    async fn condense(
        &self,
        profile: &Profile,
        transcript: &[Turn],
        tag: &str,
    ) -> anyhow::Result<String> {
        let rendered = trim_turns(transcript, usize::MAX, tag)
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage::new("system", CONDENSE_DIRECTIVE),
            ChatMessage::new("user", rendered),
        ];
        let response = self
            .provider
            .create_completion(CompletionRequest::new(profile.model.clone(), messages))
            .await?;
        Ok(response.content)
    }
}
