//! Inbound event classification.
//!
//! Decides, for each platform event, whether it starts a session, belongs
//! to an active one, is a control phrase, or should be ignored. The
//! classifier is pure: registry lookups happen in the engine and their
//! results are passed in.

use crate::platform::PlatformEvent;

/// What to do with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Create a new session for the author and append this event
    StartSession,
    /// Append to the author's active session (or, for bot-authored
    /// events, to the session bound to this channel)
    Append,
    /// Process this turn, then end the author's session
    Terminate,
    /// Switch the author's session into run-polling mode
    TriggerRun {
        /// The trigger phrase doubled as the termination phrase
        then_end: bool,
    },
    /// The author already has a session pinned to a different channel
    RejectWrongChannel,
    /// Not relevant to any session
    Ignore,
}

/// Registry view of an active session, as needed for classification.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    /// Owning user id
    pub user_id: String,
    /// Channel the session is pinned to
    pub channel_id: String,
    /// Control phrase that triggers run-polling, from the bound profile
    pub run_key: Option<String>,
}

/// Classify an inbound event.
///
/// * `author_session` — the author's active session, if any.
/// * `channel_has_session` — whether any session is pinned to the
///   event's channel (used for bot-authored events).
pub fn classify(
    event: &PlatformEvent,
    author_session: Option<&ActiveSession>,
    channel_has_session: bool,
    termination_phrase: &str,
) -> Classification {
    // The bot's own messages never start or control sessions, but they
    // are appended inside an active session's channel so the completion
    // service sees its own prior turns.
    if event.author_is_bot {
        if channel_has_session {
            return Classification::Append;
        }
        return Classification::Ignore;
    }

    let trimmed = event.content.trim();

    if let Some(session) = author_session {
        // One session per user at a time, channel-pinned.
        if session.channel_id != event.channel_id {
            return Classification::RejectWrongChannel;
        }

        let is_termination = trimmed.eq_ignore_ascii_case(termination_phrase);
        if let Some(run_key) = &session.run_key {
            if trimmed.eq_ignore_ascii_case(run_key) {
                return Classification::TriggerRun {
                    then_end: is_termination,
                };
            }
        }
        if is_termination {
            return Classification::Terminate;
        }
        return Classification::Append;
    }

    // No active session: a DM, or an explicit mention elsewhere, starts one.
    if event.channel_is_direct || event.mentions_bot {
        return Classification::StartSession;
    }

    Classification::Ignore
}
