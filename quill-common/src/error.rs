//! Error types for the Quill bot.

use thiserror::Error;

/// Result type alias using the Quill error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Quill services.
///
/// Every terminal failure path in a session maps to exactly one
/// user-visible notice via [`Error::user_notice`]; silent termination
/// is treated as a defect.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session idle window or UI selection window elapsed
    #[error("Interaction timed out")]
    InteractionTimeout,

    /// Structured output failed to parse or validate after the retry budget
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Completion, image, or run API error
    #[error("Upstream service error: {0}")]
    Upstream(String),

    /// Session registry is at its concurrent-session limit
    #[error("Session capacity exceeded")]
    CapacityExceeded,

    /// Store write failed during retention
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Human-readable notice to emit before releasing a session.
    ///
    /// Full error details stay in the server-side logs; the user only
    /// ever sees these messages.
    pub fn user_notice(&self) -> String {
        match self {
            Self::InteractionTimeout => {
                "This conversation has been closed due to inactivity. \
                 Say hello again to start a new one."
                    .to_string()
            }
            Self::Validation(_) => {
                "I couldn't produce a well-formed response after several tries, \
                 so I'm closing this conversation. Please start again."
                    .to_string()
            }
            Self::Upstream(_) => {
                "Something went wrong while talking to the assistant service. \
                 Please try again later."
                    .to_string()
            }
            Self::CapacityExceeded => {
                "I'm handling too many conversations right now. \
                 Please try again in a few minutes."
                    .to_string()
            }
            _ => "Something unexpected went wrong. Please try again later.".to_string(),
        }
    }

    /// Check if this failure should be surfaced to the user at all.
    ///
    /// Persistence failures are logged server-side only and never block
    /// session teardown.
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }

    /// Check if this is a timeout.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::InteractionTimeout)
    }

    /// Check if this is an upstream service failure.
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
