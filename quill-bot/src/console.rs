//! Console loopback channel.
//!
//! Drives the whole session engine from a terminal: each stdin line
//! becomes a direct-message event from a synthetic local user, and
//! outbound messages print to stdout. Useful for local conversations
//! without any platform connection.

use async_trait::async_trait;
use quill_session::{Outbound, PlatformEvent, SessionEngine};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const CONSOLE_USER: &str = "console-user";
pub const CONSOLE_CHANNEL: &str = "console";

/// Prints outbound messages to stdout, minus the interaction-tag label.
pub struct ConsoleOutbound;

fn strip_label(text: &str) -> &str {
    if text.starts_with("[#") {
        if let Some(end) = text.find(']') {
            return text[end + 1..].trim_start();
        }
    }
    text
}

#[async_trait]
impl Outbound for ConsoleOutbound {
    async fn send(&self, _channel_id: &str, text: &str) -> anyhow::Result<()> {
        println!("quill> {}", strip_label(text));
        Ok(())
    }

    async fn send_with_files(
        &self,
        _channel_id: &str,
        text: &str,
        files: &[PathBuf],
    ) -> anyhow::Result<()> {
        println!("quill> {}", strip_label(text));
        for file in files {
            println!("quill> [file] {}", file.display());
        }
        Ok(())
    }
}

fn console_event(content: String) -> PlatformEvent {
    PlatformEvent {
        author_id: CONSOLE_USER.to_string(),
        author_is_bot: false,
        channel_id: CONSOLE_CHANNEL.to_string(),
        channel_is_direct: true,
        content,
        attachments: Vec::new(),
        mentions_bot: false,
    }
}

/// Read stdin lines into the engine until EOF or ctrl-c.
pub async fn chat_loop(engine: &SessionEngine, termination_phrase: &str) -> anyhow::Result<()> {
    println!("Quill console. Say something to start a conversation; \"{termination_phrase}\" ends it. Ctrl-C exits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    engine.handle_event(console_event(trimmed.to_string())).await;
                }
                None => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("[#ab12cd] hello"), "hello");
        assert_eq!(strip_label("no label here"), "no label here");
        assert_eq!(strip_label("[#x]"), "");
    }
}
