//! Platform messaging boundary.
//!
//! The engine consumes inbound [`PlatformEvent`]s and emits text through
//! the [`Outbound`] trait; everything platform-specific (gateway sockets,
//! UI components, webhook parsing) lives behind these two shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An inbound platform event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Author user id
    pub author_id: String,
    /// Whether the author is the bot itself
    pub author_is_bot: bool,
    /// Channel the event arrived in
    pub channel_id: String,
    /// Whether the channel is a direct-message channel
    pub channel_is_direct: bool,
    /// Text content
    pub content: String,
    /// Attachment references (urls or file ids)
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Whether the event explicitly mentions the bot
    #[serde(default)]
    pub mentions_bot: bool,
}

/// Outbound messaging primitives.
///
/// Implement this to connect the engine to a platform.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send a message to a channel.
    async fn send(&self, channel_id: &str, text: &str) -> anyhow::Result<()>;

    /// Send a message with file attachments.
    async fn send_with_files(
        &self,
        channel_id: &str,
        text: &str,
        files: &[PathBuf],
    ) -> anyhow::Result<()>;

    /// Edit the most recent message the bot sent in a channel.
    ///
    /// Platforms without message editing can fall back to sending.
    async fn edit_last(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.send(channel_id, text).await
    }
}
