//! End-to-end session lifecycle tests.
//!
//! Drives the engine through its public surface only: platform events
//! in, outbound messages and store contents out.

use async_trait::async_trait;
use quill_common::config::Config;
use quill_profiles::profile::Profile;
use quill_profiles::store::ProfileStore;
use quill_providers::provider::CompletionProvider;
use quill_providers::types::{CompletionRequest, CompletionResponse, RunStatus, RunTranscript};
use quill_session::artifacts::ArtifactStore;
use quill_session::session::SessionDeps;
use quill_session::{Outbound, PlatformEvent, SessionEngine, SessionRegistry};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    statuses: Mutex<VecDeque<RunStatus>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            statuses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("out of scripted replies"))?;
        Ok(CompletionResponse {
            content,
            tool_calls: Vec::new(),
        })
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
        _instructions: &str,
    ) -> anyhow::Result<String> {
        Ok("run-1".to_string())
    }

    async fn run_status(&self, _thread_id: &str, _run_id: &str) -> anyhow::Result<RunStatus> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RunStatus::Completed))
    }

    async fn list_run_messages(&self, _thread_id: &str) -> anyhow::Result<RunTranscript> {
        Ok(RunTranscript {
            turns: vec![quill_providers::types::ChatMessage::new(
                "assistant",
                "run result text",
            )],
            file_refs: Vec::new(),
        })
    }

    fn supports_runs(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct CapturingOutbound {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Outbound for CapturingOutbound {
    async fn send(&self, _channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_with_files(
        &self,
        channel_id: &str,
        text: &str,
        _files: &[PathBuf],
    ) -> anyhow::Result<()> {
        self.send(channel_id, text).await
    }
}

struct TestBot {
    provider: Arc<ScriptedProvider>,
    outbound: Arc<CapturingOutbound>,
    store: Arc<ProfileStore>,
    engine: SessionEngine,
    _artifacts: tempfile::TempDir,
}

fn bot(replies: &[&str]) -> TestBot {
    let mut config = Config::default();
    config.session.idle_timeout_ms = 500;
    config.poll.base_delay_ms = 1;
    config.poll.max_delay_ms = 4;

    let provider = Arc::new(ScriptedProvider::new(replies));
    let outbound = Arc::new(CapturingOutbound::default());
    let store = Arc::new(ProfileStore::in_memory().unwrap());
    let artifacts = tempfile::tempdir().unwrap();

    let engine = SessionEngine::new(SessionDeps {
        provider: provider.clone(),
        outbound: outbound.clone(),
        store: store.clone(),
        artifacts: Arc::new(ArtifactStore::new(artifacts.path())),
        registry: Arc::new(SessionRegistry::new(8)),
        config: Arc::new(config),
    });

    TestBot {
        provider,
        outbound,
        store,
        engine,
        _artifacts: artifacts,
    }
}

fn dm(content: &str) -> PlatformEvent {
    PlatformEvent {
        author_id: "alice".into(),
        author_is_bot: false,
        channel_id: "dm-alice".into(),
        channel_is_direct: true,
        content: content.into(),
        attachments: vec![],
        mentions_bot: false,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

fn assistant_profile(selected: bool) -> Profile {
    Profile {
        id: "p-alice".into(),
        user_id: "alice".into(),
        name: "Concierge".into(),
        system_prompt: "You are a concierge.".into(),
        model: "gpt-4o".into(),
        assistant_id: Some("asst_1".into()),
        thread_id: Some("thread_1".into()),
        structured_output: false,
        idle_timeout_ms: 0,
        retention: true,
        retention_size: 4,
        retention_data: vec![],
        condensed_retention_data: String::new(),
        selected,
    }
}

#[tokio::test]
async fn full_conversation_lifecycle() {
    let b = bot(&["Hello Alice!", "Of course.", "Goodbye then!"]);
    b.store.insert_profile(&assistant_profile(true)).unwrap();

    b.engine.handle_event(dm("hello")).await;
    settle().await;
    b.engine.handle_event(dm("can you help me?")).await;
    settle().await;
    b.engine.handle_event(dm("run concierge")).await;
    settle().await;
    b.engine.handle_event(dm("goodbye")).await;
    settle().await;

    let sent = b.outbound.sent.lock().unwrap().clone();
    assert!(sent[0].contains("Hello Alice!"));
    assert!(sent[1].contains("Of course."));
    assert!(sent.iter().any(|t| t.contains("run result text")));
    assert!(sent.last().unwrap().contains("Goodbye then!"));

    // Session slot freed after termination
    assert_eq!(b.engine.registry().count().await, 0);

    // Retention kept the tail of the conversation for the next session
    let profile = b.store.get_profile("p-alice").unwrap().unwrap();
    assert_eq!(profile.retention_data.len(), 4);
    assert!(profile
        .retention_data
        .iter()
        .all(|turn| !turn.content.contains("[#")));
}

#[tokio::test]
async fn retained_context_is_replayed_in_next_session() {
    let b = bot(&["noted", "bye", "welcome back"]);
    b.store.insert_profile(&assistant_profile(true)).unwrap();

    b.engine.handle_event(dm("my cat is called Fig")).await;
    settle().await;
    b.engine.handle_event(dm("goodbye")).await;
    settle().await;
    assert_eq!(b.engine.registry().count().await, 0);

    b.engine.handle_event(dm("hello again")).await;
    settle().await;

    let requests = b.provider.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert!(last
        .messages
        .iter()
        .any(|m| m.content.contains("my cat is called Fig")));
}

#[tokio::test]
async fn idle_timeout_closes_the_session() {
    let b = bot(&["hi"]);

    b.engine.handle_event(dm("hello")).await;
    settle().await;
    assert_eq!(b.engine.registry().count().await, 1);

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(b.engine.registry().count().await, 0);
    let sent = b.outbound.sent.lock().unwrap().clone();
    assert!(sent.last().unwrap().contains("inactivity"));
}

#[tokio::test]
async fn second_user_conversation_is_independent() {
    let b = bot(&["hi alice", "hi bob"]);

    b.engine.handle_event(dm("hello")).await;
    settle().await;

    let mut bob = dm("hello");
    bob.author_id = "bob".into();
    bob.channel_id = "dm-bob".into();
    b.engine.handle_event(bob).await;
    settle().await;

    assert_eq!(b.engine.registry().count().await, 2);
    let requests = b.provider.requests.lock().unwrap();
    // Each session only ever sees its own turns
    assert!(requests.iter().all(|r| r.messages.len() == 1));
}
