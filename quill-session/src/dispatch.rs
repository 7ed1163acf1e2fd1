//! Response dispatch: sanitization and platform-safe chunking.

use crate::platform::Outbound;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

/// Mention markup as platforms render it (`<@123>`, `<@!123>`, `<@&123>`).
fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<@[!&]?\d+>").expect("static regex"))
}

/// Render an interaction tag as the label embedded in outbound text.
pub fn tag_label(tag: &str) -> String {
    format!("[#{tag}]")
}

/// Remove control tokens the model may have echoed back: mention markup
/// and the session's own interaction-tag label.
pub fn sanitize(text: &str, tag: &str) -> String {
    let without_mentions = mention_pattern().replace_all(text, "");
    without_mentions.replace(&tag_label(tag), "").trim().to_string()
}

/// Split text into fixed-width segments of at most `limit` characters.
///
/// Pure slicing: character order is preserved and concatenating the
/// segments reproduces the input losslessly. Splits count characters,
/// not bytes, so multi-byte text never lands on a broken boundary.
pub fn chunk(text: &str, limit: usize) -> Vec<String> {
    assert!(limit > 0, "chunk limit must be positive");
    if text.is_empty() {
        return Vec::new();
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == limit {
            segments.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Emits sanitized, chunked responses for one session.
pub struct Dispatcher {
    outbound: Arc<dyn Outbound>,
    channel_id: String,
    tag: String,
    limit: usize,
}

impl Dispatcher {
    pub fn new(outbound: Arc<dyn Outbound>, channel_id: String, tag: String, limit: usize) -> Self {
        Self {
            outbound,
            channel_id,
            tag,
            limit,
        }
    }

    /// Sanitize, chunk, and send a response.
    ///
    /// Every segment carries the session's tag label so the session can
    /// recognize its own replies when they loop back as events.
    /// Attachments ride only on the last segment.
    pub async fn dispatch(&self, raw: &str, attachments: &[PathBuf]) -> anyhow::Result<()> {
        let label = tag_label(&self.tag);
        let clean = sanitize(raw, &self.tag);

        // Reserve room for the label prefix so sends stay within the limit.
        let budget = self.limit.saturating_sub(label.chars().count() + 1).max(1);
        let segments = chunk(&clean, budget);

        if segments.is_empty() {
            if !attachments.is_empty() {
                self.outbound
                    .send_with_files(&self.channel_id, &label, attachments)
                    .await?;
            }
            return Ok(());
        }

        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let text = format!("{label} {segment}");
            if i == last && !attachments.is_empty() {
                self.outbound
                    .send_with_files(&self.channel_id, &text, attachments)
                    .await?;
            } else {
                self.outbound.send(&self.channel_id, &text).await?;
            }
        }

        Ok(())
    }

    /// Replace the bot's most recent message in the channel.
    ///
    /// Short status text only; platforms without editing fall back to a
    /// plain send.
    pub async fn edit(&self, raw: &str) -> anyhow::Result<()> {
        let text = format!("{} {}", tag_label(&self.tag), sanitize(raw, &self.tag));
        self.outbound.edit_last(&self.channel_id, &text).await
    }
}
