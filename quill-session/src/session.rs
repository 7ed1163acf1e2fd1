//! Session state machine.
//!
//! Each session is one spawned task owning its state outright: a turn
//! buffer, an idle deadline, and an mpsc command queue. The task loop
//! selects between the queue and the deadline, so there is exactly one
//! logical writer and at most one provider request in flight per
//! session. Commands arriving mid-request buffer in the queue and are
//! handled in order on the next iteration.

use crate::artifacts::ArtifactStore;
use crate::dispatch::{self, Dispatcher};
use crate::platform::{Outbound, PlatformEvent};
use crate::registry::SessionRegistry;
use crate::retention::RetentionManager;
use crate::runpoll::{self, PollOutcome};
use quill_common::config::Config;
use quill_common::Error;
use quill_profiles::profile::{Profile, Role, Turn};
use quill_profiles::store::ProfileStore;
use quill_providers::provider::CompletionProvider;
use quill_providers::types::{ChatMessage, CompletionRequest};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

/// Commands fed into a session task by the engine.
#[derive(Debug)]
pub enum SessionCommand {
    /// Append an inbound event (user turn or the bot's own loopback)
    Append(PlatformEvent),
    /// Process this final turn, then end the session
    Terminate(PlatformEvent),
    /// Switch to run-polling mode
    TriggerRun {
        /// End the session once the run resolves
        then_end: bool,
    },
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting inbound turns
    Collecting,
    /// A completion request is in flight
    AwaitingCompletion,
    /// An async run is being polled
    PollingRun,
    /// Terminal
    Ended,
}

/// Shared services a session needs, bundled for spawning.
#[derive(Clone)]
pub struct SessionDeps {
    pub provider: Arc<dyn CompletionProvider>,
    pub outbound: Arc<dyn Outbound>,
    pub store: Arc<ProfileStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

/// Generate a short random interaction tag.
pub fn generate_tag() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| {
            let n = rng.gen_range(0..36);
            char::from_digit(n, 36).unwrap_or('0')
        })
        .collect()
}

/// One live conversation, driven by [`Session::run`].
pub struct Session {
    user_id: String,
    channel_id: String,
    tag: String,
    profile: Option<Profile>,
    state: SessionState,
    transcript: Vec<Turn>,
    idle_timeout: Duration,
    idle_deadline: Instant,
    rx: mpsc::Receiver<SessionCommand>,
    dispatcher: Dispatcher,
    retention: RetentionManager,
    deps: SessionDeps,
}

impl Session {
    /// Build a session bound to an optional profile.
    ///
    /// The profile, once bound, is immutable for the session's lifetime;
    /// later profile edits only affect future sessions.
    pub fn new(
        user_id: String,
        channel_id: String,
        tag: String,
        profile: Option<Profile>,
        rx: mpsc::Receiver<SessionCommand>,
        deps: SessionDeps,
    ) -> Self {
        let idle_timeout = Duration::from_millis(
            profile
                .as_ref()
                .map(|p| p.idle_timeout_ms)
                .filter(|ms| *ms > 0)
                .unwrap_or(deps.config.session.idle_timeout_ms),
        );
        let dispatcher = Dispatcher::new(
            deps.outbound.clone(),
            channel_id.clone(),
            tag.clone(),
            deps.config.dispatch.message_limit,
        );
        let retention = RetentionManager::new(deps.store.clone(), deps.provider.clone());

        let mut session = Self {
            user_id,
            channel_id,
            tag,
            profile,
            state: SessionState::Collecting,
            transcript: Vec::new(),
            idle_timeout,
            idle_deadline: Instant::now() + idle_timeout,
            rx,
            dispatcher,
            retention,
            deps,
        };
        session.seed_transcript();
        session
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Replay the profile's prompt and retained context as the opening
    /// turns of the transcript.
    fn seed_transcript(&mut self) {
        let Some(profile) = &self.profile else {
            return;
        };
        if !profile.system_prompt.is_empty() {
            self.transcript
                .push(Turn::new(Role::System, profile.system_prompt.clone()));
        }
        if !profile.retention {
            return;
        }
        if profile.retention_size == 0 {
            if !profile.condensed_retention_data.is_empty() {
                self.transcript.push(Turn::new(
                    Role::System,
                    format!(
                        "Summary of the previous conversation:\n{}",
                        profile.condensed_retention_data
                    ),
                ));
            }
        } else {
            self.transcript.extend(profile.retention_data.iter().cloned());
        }
    }

    fn touch(&mut self) {
        self.idle_deadline = Instant::now() + self.idle_timeout;
    }

    /// Drive the session to completion. Consumes the session; when this
    /// returns, retention has run and the registry slot is free.
    pub async fn run(mut self) {
        tracing::info!(user_id = %self.user_id, channel_id = %self.channel_id, tag = %self.tag, "Session started");

        let farewell = loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(SessionCommand::Append(event)) => {
                        if event.author_is_bot {
                            self.absorb_bot_event(event);
                            continue;
                        }
                        self.touch();
                        self.append_user_turn(&event);
                        match self.complete_turn().await {
                            Ok(()) => {}
                            Err(e) => break Some(e.user_notice()),
                        }
                    }
                    Some(SessionCommand::Terminate(event)) => {
                        self.touch();
                        self.append_user_turn(&event);
                        // The session ends either way, but a failed
                        // farewell still owes the user one notice.
                        match self.complete_turn().await {
                            Ok(()) => break None,
                            Err(e) => {
                                tracing::warn!(error = %e, "Farewell completion failed");
                                break Some(e.user_notice());
                            }
                        }
                    }
                    Some(SessionCommand::TriggerRun { then_end }) => {
                        self.touch();
                        match self.execute_run().await {
                            Ok(()) if then_end => break None,
                            Ok(()) => {}
                            Err(e) => break Some(e.user_notice()),
                        }
                    }
                    None => break None,
                },
                _ = time::sleep_until(self.idle_deadline) => {
                    tracing::info!(user_id = %self.user_id, "Session idle timeout");
                    break Some(Error::InteractionTimeout.user_notice());
                }
            }
        };

        self.state = SessionState::Ended;
        if let Some(notice) = farewell {
            if let Err(e) = self.dispatcher.dispatch(&notice, &[]).await {
                tracing::warn!(error = %e, "Failed to send session-end notice");
            }
        }
        self.finish().await;
    }

    /// The bot's own dispatched replies loop back as inbound events.
    /// Tagged ones were already appended at dispatch time and are
    /// dropped; untagged bot messages in the channel are kept as
    /// conversation context.
    fn absorb_bot_event(&mut self, event: PlatformEvent) {
        if event.content.contains(&dispatch::tag_label(&self.tag)) {
            return;
        }
        self.transcript.push(Turn::new(Role::User, event.content));
    }

    fn append_user_turn(&mut self, event: &PlatformEvent) {
        let mut turn = Turn::new(Role::User, event.content.clone());
        turn.attachments = event.attachments.clone();
        self.transcript.push(turn);
    }

    /// Request a completion for the buffered transcript and dispatch it.
    async fn complete_turn(&mut self) -> Result<(), Error> {
        self.state = SessionState::AwaitingCompletion;
        let content = self.request_completion().await?;
        self.transcript.push(Turn::new(Role::Assistant, content.clone()));
        if let Err(e) = self.dispatcher.dispatch(&content, &[]).await {
            tracing::warn!(error = %e, "Failed to dispatch completion");
        }
        self.state = SessionState::Collecting;
        Ok(())
    }

    /// One completion request, or the structured-output retry loop when
    /// the profile demands JSON.
    async fn request_completion(&mut self) -> Result<String, Error> {
        let request = self.build_request();
        let structured = self
            .profile
            .as_ref()
            .is_some_and(|p| p.structured_output);

        if !structured {
            let response = self
                .deps
                .provider
                .create_completion(request)
                .await
                .map_err(|e| Error::Upstream(e.to_string()))?;
            return Ok(response.content);
        }

        // Fixed-delay retries for malformed payloads. Transport failures
        // are not retried here; they are upstream errors like any other.
        let retry = &self.deps.config.json_retry;
        let mut last_failure = String::new();
        for attempt in 1..=retry.max_attempts {
            let response = self
                .deps
                .provider
                .create_completion(request.clone().with_json_output())
                .await
                .map_err(|e| Error::Upstream(e.to_string()))?;

            match serde_json::from_str::<serde_json::Value>(&response.content) {
                Ok(value) if value.is_object() => return Ok(response.content),
                Ok(_) => last_failure = "payload was not a JSON object".to_string(),
                Err(e) => last_failure = e.to_string(),
            }
            tracing::warn!(attempt, failure = %last_failure, "Structured output failed validation");
            if attempt < retry.max_attempts {
                time::sleep(Duration::from_millis(retry.delay_ms)).await;
            }
        }
        Err(Error::Validation(last_failure))
    }

    /// Render the transcript for the provider: system turns first, then
    /// the most recent conversation turns up to the context cap.
    fn build_request(&self) -> CompletionRequest {
        let cap = self.deps.config.session.context_turns;
        let (system, conversation): (Vec<&Turn>, Vec<&Turn>) = self
            .transcript
            .iter()
            .partition(|turn| turn.role == Role::System);

        let skip = conversation.len().saturating_sub(cap);
        let messages = system
            .into_iter()
            .chain(conversation.into_iter().skip(skip))
            .map(|turn| ChatMessage::new(turn.role.as_str(), turn.content.clone()))
            .collect();

        let model = self
            .profile
            .as_ref()
            .map(|p| p.model.clone())
            .unwrap_or_else(|| self.deps.config.provider.model.clone());
        CompletionRequest::new(model, messages)
    }

    /// Submit an async run and poll it to resolution.
    async fn execute_run(&mut self) -> Result<(), Error> {
        let Some(profile) = self.profile.clone() else {
            self.notify("No profile is selected, so there is no run to start.")
                .await;
            return Ok(());
        };
        let (Some(thread_id), Some(assistant_id)) =
            (profile.thread_id.clone(), profile.assistant_id.clone())
        else {
            self.notify("This profile is not set up for runs.").await;
            return Ok(());
        };

        self.state = SessionState::PollingRun;
        let run_id = self
            .deps
            .provider
            .create_run(&thread_id, &assistant_id, &profile.system_prompt)
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        tracing::info!(run_id = %run_id, user_id = %self.user_id, "Run submitted");

        let outcome = runpoll::poll_run(
            self.deps.provider.as_ref(),
            &thread_id,
            &run_id,
            &self.deps.config.poll,
            self.idle_deadline,
            &self.dispatcher,
        )
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

        match outcome {
            PollOutcome::Completed => {
                self.deliver_run_results(&thread_id).await?;
                self.state = SessionState::Collecting;
                Ok(())
            }
            PollOutcome::Failed(status) => {
                tracing::warn!(run_id = %run_id, ?status, "Run failed");
                Err(Error::Upstream(format!("run ended with status {status:?}")))
            }
            PollOutcome::Exhausted => {
                tracing::warn!(run_id = %run_id, "Run poll budget exhausted");
                Err(Error::Upstream("run did not finish in time".to_string()))
            }
            PollOutcome::IdleExpired => Err(Error::InteractionTimeout),
        }
    }

    /// Fetch the run transcript, stage produced files, and dispatch the
    /// final assistant message with its attachments.
    async fn deliver_run_results(&mut self, thread_id: &str) -> Result<(), Error> {
        let transcript = self
            .deps
            .provider
            .list_run_messages(thread_id)
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        for file_ref in &transcript.file_refs {
            let name = file_ref.filename.clone().unwrap_or_else(|| file_ref.id.clone());
            match self.deps.provider.download_file(&file_ref.id).await {
                Ok(bytes) => {
                    if let Err(e) = self.deps.artifacts.store(&self.tag, &name, &bytes).await {
                        tracing::warn!(file_id = %file_ref.id, error = %e, "Failed to stage artifact");
                    }
                }
                Err(e) => {
                    tracing::warn!(file_id = %file_ref.id, error = %e, "Failed to download run file")
                }
            }
        }
        let files = self
            .deps
            .artifacts
            .collect(&self.tag)
            .await
            .unwrap_or_default();

        let reply = transcript
            .turns
            .iter()
            .rev()
            .find(|turn| turn.role == "assistant")
            .map(|turn| turn.content.clone())
            .unwrap_or_else(|| "The run finished without producing a reply.".to_string());

        self.transcript.push(Turn::new(Role::Assistant, reply.clone()));
        if let Err(e) = self.dispatcher.dispatch(&reply, &files).await {
            tracing::warn!(error = %e, "Failed to dispatch run results");
        }
        Ok(())
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.dispatcher.dispatch(text, &[]).await {
            tracing::warn!(error = %e, "Failed to send notice");
        }
    }

    /// Teardown: retention, artifact cleanup, registry release.
    async fn finish(self) {
        if let Some(profile) = &self.profile {
            self.retention
                .on_session_end(profile, &self.transcript, &self.tag)
                .await;
        }
        if let Err(e) = self.deps.artifacts.cleanup(&self.tag).await {
            tracing::warn!(tag = %self.tag, error = %e, "Artifact cleanup failed");
        }
        self.deps.registry.release(&self.user_id).await;
        tracing::info!(user_id = %self.user_id, tag = %self.tag, "Session ended");
    }
}
