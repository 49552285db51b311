//! End-to-end engine flow against in-memory fakes: a transcript store
//! with store-assigned ids, scripted providers, and a no-op artifact
//! store. Timer-driven scenarios run on paused tokio time.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use council::artifacts::{ArtifactRef, ArtifactStore};
use council::beads::CommentStore;
use council::config::CouncilConfig;
use council::engine::Engine;
use council::errors::{CouncilError, ProviderFailure};
use council::events::EngineEvent;
use council::provider::{Provider, ProviderName, ProviderRequest, ProviderTable};
use council::schema::{Artifact, Phase};
use council::transcript::Comment;

#[derive(Default)]
struct MemoryStore {
    comments: Mutex<Vec<Comment>>,
}

impl MemoryStore {
    fn texts(&self) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.text.clone())
            .collect()
    }

    fn inject(&self, text: &str) {
        let mut comments = self.comments.lock().unwrap();
        let id = comments.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        comments.push(Comment {
            id,
            text: text.to_string(),
            author: Some("human".into()),
            issue_id: None,
            created_at: None,
        });
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn add_comment(&self, _issue_id: &str, text: &str) -> Result<()> {
        self.inject(text);
        Ok(())
    }

    async fn list_comments(&self, _issue_id: &str) -> Result<Vec<Comment>> {
        Ok(self.comments.lock().unwrap().clone())
    }
}

struct NullArtifacts;

#[async_trait]
impl ArtifactStore for NullArtifacts {
    async fn persist(
        &self,
        _issue_id: &str,
        _round: u32,
        _phase: Phase,
        _agent_name: &str,
        _artifacts: &[Artifact],
    ) -> Result<Vec<ArtifactRef>> {
        Ok(Vec::new())
    }
}

/// Pops one scripted reply per invocation; repeats the last one when the
/// script runs dry.
struct Scripted {
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl Scripted {
    fn new(replies: Vec<Result<String, String>>) -> Arc<dyn Provider> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
        })
    }
}

#[async_trait]
impl Provider for Scripted {
    async fn invoke(&self, _request: &ProviderRequest) -> Result<String, ProviderFailure> {
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or(Err("script exhausted".into()))
        };
        reply.map_err(ProviderFailure::message)
    }
}

fn reply(agent: &str, score: f64, more_rounds: bool, questions: &[&str]) -> Result<String, String> {
    Ok(serde_json::json!({
        "agent": agent,
        "round": 1,
        "phase": "research",
        "message": format!("{agent} findings"),
        "chair_score": score,
        "chair_reason": "test",
        "need_another_round": more_rounds,
        "questions_for_user": questions,
    })
    .to_string())
}

fn quiet_config() -> CouncilConfig {
    CouncilConfig {
        heartbeat_seconds: 0,
        beads_heartbeat_seconds: 0,
        user_wait_seconds: 0,
        repo_context_enabled: false,
        ..CouncilConfig::default()
    }
}

fn engine_with(
    config: CouncilConfig,
    store: Arc<MemoryStore>,
    table: ProviderTable,
) -> (Engine, Arc<Mutex<Vec<EngineEvent>>>) {
    let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let engine = Engine::new(
        "council-1",
        "design a rate limiter",
        config,
        store,
        table,
        Arc::new(NullArtifacts),
    )
    .unwrap()
    .with_event_sink(move |e| sink_events.lock().unwrap().push(e.clone()));
    (engine, events)
}

#[tokio::test]
async fn converges_after_one_round_when_nobody_asks_for_more() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![
        (ProviderName::Codex, Scripted::new(vec![reply("codex", 6.0, false, &[])])),
        (ProviderName::Claude, Scripted::new(vec![reply("claude", 9.0, false, &[])])),
        (ProviderName::Gemini, Scripted::new(vec![reply("gemini", 4.0, false, &[])])),
    ];

    let (engine, _) = engine_with(quiet_config(), store.clone(), table);
    engine.run().await.unwrap();

    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("Round 1 starting (research)")));
    assert!(texts.iter().any(|t| t.contains("Chair selected: `claude`")));
    assert!(texts.iter().any(|t| t.contains("Session converged after round 1.")));
    assert!(!texts.iter().any(|t| t.contains("Round 2 starting")));
}

#[tokio::test]
async fn max_rounds_reached_when_critique_keeps_asking_for_more() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![
        (ProviderName::Codex, Scripted::new(vec![reply("codex", 5.0, true, &[])])),
        (ProviderName::Claude, Scripted::new(vec![reply("claude", 5.0, true, &[])])),
    ];

    let config = CouncilConfig {
        max_rounds: 1,
        ..quiet_config()
    };
    let (engine, _) = engine_with(config, store.clone(), table);
    engine.run().await.unwrap();

    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("Max rounds reached; stopping.")));
    assert!(!texts.iter().any(|t| t.contains("Session converged")));
}

#[tokio::test]
async fn total_research_failure_is_fatal_and_skips_critique() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![
        (ProviderName::Codex, Scripted::new(vec![Err("codex exploded".into())])),
        (ProviderName::Claude, Scripted::new(vec![Err("claude exploded".into())])),
    ];

    let (engine, _) = engine_with(quiet_config(), store.clone(), table);
    let err = engine.run().await.unwrap_err();
    assert!(matches!(
        err,
        CouncilError::PhaseExhausted {
            phase: Phase::Research
        }
    ));

    let texts = store.texts();
    assert!(texts
        .iter()
        .any(|t| t.contains("No providers produced a research response; aborting.")));
    assert!(texts.iter().any(|t| t.contains("codex exploded")));
    assert!(!texts.iter().any(|t| t.contains("(critique)")));
}

#[tokio::test]
async fn one_bad_provider_is_absorbed() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![
        (ProviderName::Codex, Scripted::new(vec![Err("no json in output".into())])),
        (ProviderName::Claude, Scripted::new(vec![reply("claude", 8.0, false, &[])])),
    ];

    let (engine, events) = engine_with(quiet_config(), store.clone(), table);
    engine.run().await.unwrap();

    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("Provider failure: `codex`")));
    assert!(texts.iter().any(|t| t.contains("Session converged after round 1.")));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::ProviderFinished { ok: false, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn user_reply_during_the_wait_window_is_picked_up_verbatim() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![(
        ProviderName::Codex,
        Scripted::new(vec![
            reply("codex", 7.0, false, &["Which database?"]),
            reply("codex", 7.0, false, &[]),
            reply("codex", 7.0, false, &[]),
        ]),
    )];

    let config = CouncilConfig {
        user_wait_seconds: 5,
        user_poll_seconds: 1,
        max_user_waits: 2,
        ..quiet_config()
    };
    let (engine, events) = engine_with(config, store.clone(), table);

    let injector_store = store.clone();
    let injector = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        injector_store.inject("**USER**\nuse postgres, with read replicas");
    });

    engine.run().await.unwrap();
    injector.await.unwrap();

    let events = events.lock().unwrap();
    let received = events.iter().find_map(|e| match e {
        EngineEvent::UserInputReceived { message, .. } => Some(message.clone()),
        _ => None,
    });
    assert_eq!(received.as_deref(), Some("use postgres, with read replicas"));
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::UserInputTimedOut { .. })));

    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("Input requested (wait 5s, 1/2)")));
    assert!(texts.iter().any(|t| t.contains("- Which database?")));
}

#[tokio::test(start_paused = true)]
async fn silent_user_wait_times_out_and_session_continues() {
    let store = Arc::new(MemoryStore::default());
    let table: ProviderTable = vec![(
        ProviderName::Gemini,
        Scripted::new(vec![
            reply("gemini", 7.0, false, &["Deadline?"]),
            reply("gemini", 7.0, false, &[]),
            reply("gemini", 7.0, false, &[]),
        ]),
    )];

    let config = CouncilConfig {
        user_wait_seconds: 3,
        user_poll_seconds: 1,
        max_user_waits: 1,
        ..quiet_config()
    };
    let (engine, events) = engine_with(config, store.clone(), table);
    engine.run().await.unwrap();

    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, EngineEvent::UserInputTimedOut { .. })));
    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("No user response within 3s; continuing.")));
    assert!(texts.iter().any(|t| t.contains("Session converged after round 1.")));
}

#[tokio::test]
async fn synthesis_falls_back_to_the_next_candidate() {
    let store = Arc::new(MemoryStore::default());
    // claude wins the chair in research, then fails its synthesis turn;
    // codex must take over.
    let table: ProviderTable = vec![
        (
            ProviderName::Codex,
            Scripted::new(vec![
                reply("codex", 5.0, false, &[]),
                reply("codex", 5.0, false, &[]),
                reply("codex", 5.0, false, &[]),
            ]),
        ),
        (
            ProviderName::Claude,
            Scripted::new(vec![
                reply("claude", 9.0, false, &[]),
                reply("claude", 9.0, false, &[]),
                Err("chair crashed".into()),
                Err("chair crashed".into()),
            ]),
        ),
    ];

    let (engine, _) = engine_with(quiet_config(), store.clone(), table);
    engine.run().await.unwrap();

    let texts = store.texts();
    assert!(texts.iter().any(|t| t.contains("Running chair `claude` (synthesis)")));
    assert!(texts.iter().any(|t| t.contains("Chair failure: `claude` (synthesis)")));
    assert!(texts.iter().any(|t| t.contains("Running chair `codex` (synthesis)")));
    assert!(texts.iter().any(|t| t.contains("Session converged after round 1.")));
}
