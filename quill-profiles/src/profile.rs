//! Profile and conversation-turn types.

use serde::{Deserialize, Serialize};

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant (AI) response
    Assistant,
    /// System message (prompts, condensed summaries)
    System,
}

impl Role {
    /// Convert to string representation for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::User, // Default fallback
        }
    }
}

/// A single turn in a conversation transcript.
///
/// Ordering is insertion order and is semantically significant: the
/// transcript is replayed verbatim to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn role (user/assistant/system)
    pub role: Role,
    /// Turn content
    pub content: String,
    /// Attachment references (urls or file ids)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Turn {
    /// Create a plain text turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// A per-user bot profile.
///
/// Invariant (enforced by the store): at most one profile per user has
/// `selected = true` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Opaque profile id
    pub id: String,
    /// Owning user id
    pub user_id: String,
    /// Display name; also the source of the run key
    pub name: String,

    /// System prompt prepended to every completion request
    pub system_prompt: String,
    /// Selected text model
    pub model: String,
    /// Assistant resource id for the async run API, if configured
    pub assistant_id: Option<String>,
    /// Conversation-thread resource id for the async run API, if configured
    pub thread_id: Option<String>,
    /// Request structured (JSON object) output from the provider
    #[serde(default)]
    pub structured_output: bool,

    /// Idle timeout for sessions bound to this profile (ms)
    pub idle_timeout_ms: u64,
    /// Persist the transcript across sessions
    pub retention: bool,
    /// 0 = condense-and-summarize; N > 0 = keep the last N turns raw
    pub retention_size: usize,

    /// Raw retained transcript (bounded by `retention_size`)
    #[serde(default)]
    pub retention_data: Vec<Turn>,
    /// Condensed summary used instead of raw turns when `retention_size == 0`
    #[serde(default)]
    pub condensed_retention_data: String,

    /// Whether this is the user's active profile
    pub selected: bool,
}

impl Profile {
    /// Control phrase that switches a session into run-polling mode.
    ///
    /// Derived deterministically from the profile name: "run " followed
    /// by the lowercased alphanumerics of the name. Matching is
    /// case-insensitive and exact.
    pub fn run_key(&self) -> String {
        let normalized: String = self
            .name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();
        format!("run {normalized}")
    }

    /// Whether this profile can drive the async run protocol.
    pub fn supports_runs(&self) -> bool {
        self.assistant_id.is_some() && self.thread_id.is_some()
    }
}
