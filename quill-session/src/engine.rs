//! Session engine.
//!
//! The single entry point for inbound platform events: classifies each
//! event against the registry, spins up session tasks, and routes
//! commands into them. Stateless apart from the registry; all
//! conversational state lives inside the session tasks.

use crate::classifier::{self, ActiveSession, Classification};
use crate::platform::PlatformEvent;
use crate::registry::{AcquireError, SessionHandle, SessionRegistry};
use crate::session::{self, Session, SessionCommand, SessionDeps};
use quill_common::Error;
use tokio::sync::mpsc;

const COMMAND_QUEUE_DEPTH: usize = 32;

/// Routes platform events into per-user session tasks.
pub struct SessionEngine {
    deps: SessionDeps,
}

impl SessionEngine {
    pub fn new(deps: SessionDeps) -> Self {
        Self { deps }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.deps.registry
    }

    /// Handle one inbound event. Never fails: every outcome is either a
    /// routed command, a user-visible notice, or a logged drop.
    pub async fn handle_event(&self, event: PlatformEvent) {
        let author_session = self.deps.registry.get(&event.author_id).await;
        let channel_session = self.deps.registry.find_by_channel(&event.channel_id).await;

        let author_view = author_session.as_ref().map(|handle| ActiveSession {
            user_id: handle.user_id.clone(),
            channel_id: handle.channel_id.clone(),
            run_key: handle.run_key.clone(),
        });

        let classification = classifier::classify(
            &event,
            author_view.as_ref(),
            channel_session.is_some(),
            &self.deps.config.session.termination_phrase,
        );
        tracing::debug!(author_id = %event.author_id, channel_id = %event.channel_id, ?classification, "Event classified");

        match classification {
            Classification::StartSession => self.start_session(event).await,
            Classification::Append => {
                let target = if event.author_is_bot {
                    channel_session
                } else {
                    author_session
                };
                if let Some(handle) = target {
                    Self::forward(&handle, SessionCommand::Append(event)).await;
                }
            }
            Classification::Terminate => {
                if let Some(handle) = author_session {
                    Self::forward(&handle, SessionCommand::Terminate(event)).await;
                }
            }
            Classification::TriggerRun { then_end } => {
                if let Some(handle) = author_session {
                    Self::forward(&handle, SessionCommand::TriggerRun { then_end }).await;
                }
            }
            Classification::RejectWrongChannel => {
                let channel = author_view
                    .map(|view| view.channel_id)
                    .unwrap_or_default();
                self.notify(
                    &event.channel_id,
                    &format!(
                        "We already have a conversation going elsewhere. \
                         Find me in <#{channel}> or say \"{}\" there first.",
                        self.deps.config.session.termination_phrase
                    ),
                )
                .await;
            }
            Classification::Ignore => {}
        }
    }

    /// Create and spawn a session for the event's author, then feed it
    /// this first event.
    async fn start_session(&self, event: PlatformEvent) {
        let profile = match self.deps.store.get_selected_profile(&event.author_id) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(user_id = %event.author_id, error = %e, "Profile lookup failed; starting without one");
                None
            }
        };

        let tag = session::generate_tag();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let handle = SessionHandle {
            user_id: event.author_id.clone(),
            channel_id: event.channel_id.clone(),
            run_key: profile.as_ref().map(|p| p.run_key()),
            tx: tx.clone(),
        };

        match self.deps.registry.acquire(handle).await {
            Ok(()) => {}
            Err(AcquireError::AlreadyActive) => {
                // Lost a race with another event from the same user;
                // hand this one to the winner.
                if let Some(existing) = self.deps.registry.get(&event.author_id).await {
                    Self::forward(&existing, SessionCommand::Append(event)).await;
                }
                return;
            }
            Err(AcquireError::CapacityExceeded) => {
                tracing::warn!(user_id = %event.author_id, "Session capacity exceeded");
                self.notify(&event.channel_id, &Error::CapacityExceeded.user_notice())
                    .await;
                return;
            }
        }

        let session = Session::new(
            event.author_id.clone(),
            event.channel_id.clone(),
            tag,
            profile,
            rx,
            self.deps.clone(),
        );
        tokio::spawn(session.run());

        Self::forward_tx(&tx, SessionCommand::Append(event)).await;
    }

    async fn forward(handle: &SessionHandle, command: SessionCommand) {
        Self::forward_tx(&handle.tx, command).await;
    }

    async fn forward_tx(tx: &mpsc::Sender<SessionCommand>, command: SessionCommand) {
        if tx.send(command).await.is_err() {
            // Session is tearing down; the registry slot clears itself.
            tracing::debug!("Dropped command for an ending session");
        }
    }

    async fn notify(&self, channel_id: &str, text: &str) {
        if let Err(e) = self.deps.outbound.send(channel_id, text).await {
            tracing::warn!(channel_id = %channel_id, error = %e, "Failed to send engine notice");
        }
    }
}
