//! Conversational session engine for the Quill bot.
//!
//! Turns a stream of independent platform events into stateful,
//! single-active-instance, timeout-bounded conversation sessions driven
//! against a completion provider.

pub mod artifacts;
pub mod classifier;
pub mod dispatch;
pub mod engine;
pub mod platform;
pub mod registry;
pub mod retention;
pub mod runpoll;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::SessionEngine;
pub use platform::{Outbound, PlatformEvent};
pub use registry::{AcquireError, SessionRegistry};
pub use session::{Session, SessionCommand, SessionState};
