//! The council engine: round/phase state machine, provider fan-out with
//! per-provider failure isolation, chair selection, and the
//! user-interjection wait protocol.
//!
//! Control flow per round:
//!
//! ```text
//! research  — fan out to all providers, collect responses, pick chair
//! critique  — fan out to all providers, chair announced first
//! synthesis — try chair candidates in order until one succeeds
//! continue? — any critique need_another_round, or questions raised at
//!             critique/synthesis
//! ```
//!
//! Partial success continues; total failure of a phase is fatal. Every
//! provider call runs through the heartbeat supervisor; the transcript is
//! re-fetched in full before each phase so providers share one view.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::beads::CommentStore;
use crate::chair::{pick_chair, synthesis_candidates};
use crate::config::CouncilConfig;
use crate::errors::{CouncilError, ProviderFailure};
use crate::events::{EngineEvent, EventSink};
use crate::format::format_agent_comment;
use crate::heartbeat::{format_elapsed, supervise};
use crate::jsonutil::{extract_first_json_object, try_parse_json};
use crate::provider::{ProviderName, ProviderRequest, ProviderTable};
use crate::repo_context::ContextSource;
use crate::schema::{normalize, AgentResponse, Phase};
use crate::transcript::{find_user_reply_since, max_comment_id, USER_MARKER};

/// One deliberation session over a single tracked issue.
pub struct Engine {
    issue_id: String,
    prompt: String,
    config: CouncilConfig,
    store: Arc<dyn CommentStore>,
    providers: ProviderTable,
    artifacts: Arc<dyn ArtifactStore>,
    context: Option<Arc<dyn ContextSource>>,
    on_event: Option<Arc<EventSink>>,
}

impl Engine {
    /// Build an engine, failing fast on invalid configuration.
    pub fn new(
        issue_id: impl Into<String>,
        prompt: impl Into<String>,
        config: CouncilConfig,
        store: Arc<dyn CommentStore>,
        providers: ProviderTable,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Result<Self, CouncilError> {
        config.validate()?;
        if providers.is_empty() {
            return Err(CouncilError::Configuration(
                "provider table must not be empty".into(),
            ));
        }
        Ok(Self {
            issue_id: issue_id.into(),
            prompt: prompt.into(),
            config,
            store,
            providers,
            artifacts,
            context: None,
            on_event: None,
        })
    }

    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_event_sink(mut self, sink: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(sink));
        self
    }

    /// Run the full deliberation to convergence, round exhaustion, or a
    /// fatal phase failure.
    pub async fn run(&self) -> Result<(), CouncilError> {
        let mut waits_used: u32 = 0;

        for round in 1..=self.config.max_rounds {
            // ── research ────────────────────────────────────────────────
            self.emit_phase(round, Phase::Research, true);
            self.post_system(
                Some(round),
                Some(Phase::Research),
                &format!("Round {round} starting (research)"),
            )
            .await?;

            let research = self.collect_phase(round, Phase::Research).await?;
            if research.is_empty() {
                self.post_system(
                    Some(round),
                    Some(Phase::Research),
                    "No providers produced a research response; aborting.",
                )
                .await?;
                return Err(CouncilError::PhaseExhausted {
                    phase: Phase::Research,
                });
            }

            let chair = pick_chair(&research);
            self.emit_phase(round, Phase::Research, false);
            let questions: Vec<String> = research
                .iter()
                .flat_map(|(_, r)| r.questions_for_user.clone())
                .collect();
            self.maybe_wait_for_user(&mut waits_used, round, Phase::Research, &questions)
                .await?;

            // ── critique ────────────────────────────────────────────────
            self.emit_phase(round, Phase::Critique, true);
            self.post_system(
                Some(round),
                Some(Phase::Critique),
                &format!("Chair selected: `{chair}` (critique)"),
            )
            .await?;

            let critique = self.collect_phase(round, Phase::Critique).await?;
            if critique.is_empty() {
                self.post_system(
                    Some(round),
                    Some(Phase::Critique),
                    "No providers produced a critique response; aborting.",
                )
                .await?;
                return Err(CouncilError::PhaseExhausted {
                    phase: Phase::Critique,
                });
            }

            let mut should_continue = critique.iter().any(|(_, r)| r.need_another_round);
            self.emit_phase(round, Phase::Critique, false);
            let questions: Vec<String> = critique
                .iter()
                .flat_map(|(_, r)| r.questions_for_user.clone())
                .collect();
            if !questions.is_empty() {
                should_continue = true;
            }
            self.maybe_wait_for_user(&mut waits_used, round, Phase::Critique, &questions)
                .await?;

            // ── synthesis ───────────────────────────────────────────────
            self.emit_phase(round, Phase::Synthesis, true);
            self.post_system(
                Some(round),
                Some(Phase::Synthesis),
                &format!(
                    "Round {round} synthesis ({})",
                    if should_continue { "CONTINUE" } else { "DONE" }
                ),
            )
            .await?;

            let transcript = self.transcript_json().await?;
            let repo_context = self.build_context(Phase::Synthesis, round).await;
            let mut synthesis: Option<(ProviderName, AgentResponse)> = None;

            for candidate in synthesis_candidates(chair, &critique) {
                self.post_system(
                    Some(round),
                    Some(Phase::Synthesis),
                    &format!("Running chair `{candidate}` (synthesis)"),
                )
                .await?;
                match self
                    .run_provider(
                        candidate,
                        format!("{candidate}-chair"),
                        round,
                        Phase::Synthesis,
                        &self.prompt,
                        &transcript,
                        &repo_context,
                    )
                    .await
                {
                    Ok(parsed) => {
                        synthesis = Some((candidate, parsed));
                        break;
                    }
                    Err(e) if e.is_recoverable() => {
                        self.post_system(
                            Some(round),
                            Some(Phase::Synthesis),
                            &format!(
                                "Chair failure: `{candidate}` (synthesis)\n\n```\n{}\n```",
                                e.render()
                            ),
                        )
                        .await?;
                    }
                    Err(e) => return Err(e),
                }
            }

            let Some((winner, synthesis)) = synthesis else {
                self.post_system(
                    Some(round),
                    Some(Phase::Synthesis),
                    "No providers produced a synthesis response; aborting.",
                )
                .await?;
                return Err(CouncilError::PhaseExhausted {
                    phase: Phase::Synthesis,
                });
            };

            let refs = self
                .artifacts
                .persist(
                    &self.issue_id,
                    round,
                    Phase::Synthesis,
                    &synthesis.agent,
                    &synthesis.artifacts,
                )
                .await?;
            self.post_comment(
                Some(round),
                Some(Phase::Synthesis),
                &format_agent_comment(winner, &synthesis, &refs),
            )
            .await?;
            self.emit_phase(round, Phase::Synthesis, false);

            if !synthesis.questions_for_user.is_empty() {
                should_continue = true;
                self.maybe_wait_for_user(
                    &mut waits_used,
                    round,
                    Phase::Synthesis,
                    &synthesis.questions_for_user,
                )
                .await?;
            }

            if !should_continue {
                self.post_system(
                    Some(round),
                    None,
                    &format!("Session converged after round {round}."),
                )
                .await?;
                info!(issue = %self.issue_id, round, "session converged");
                return Ok(());
            }
        }

        self.post_system(None, None, "Max rounds reached; stopping.")
            .await?;
        info!(issue = %self.issue_id, max_rounds = self.config.max_rounds, "max rounds reached");
        Ok(())
    }

    /// Out-of-band single-shot invocation tagged `oracle` (plan mode).
    /// Not part of the round loop.
    pub async fn run_oracle(
        &self,
        provider: ProviderName,
        prompt: &str,
    ) -> Result<AgentResponse, CouncilError> {
        self.post_system(
            None,
            Some(Phase::Oracle),
            &format!("Plan mode requested (provider: `{provider}`)"),
        )
        .await?;

        let transcript = self.transcript_json().await?;
        let repo_context = self.build_context(Phase::Oracle, 1).await;
        let parsed = self
            .run_provider(
                provider,
                format!("{provider}-plan-chair"),
                1,
                Phase::Oracle,
                prompt,
                &transcript,
                &repo_context,
            )
            .await?;

        let refs = self
            .artifacts
            .persist(&self.issue_id, 1, Phase::Oracle, &parsed.agent, &parsed.artifacts)
            .await?;
        self.post_comment(
            None,
            Some(Phase::Oracle),
            &format_agent_comment(provider, &parsed, &refs),
        )
        .await?;
        Ok(parsed)
    }

    /// Fan out sequentially to every provider for one research/critique
    /// phase. A single provider's failure is posted and skipped; only
    /// store errors abort.
    async fn collect_phase(
        &self,
        round: u32,
        phase: Phase,
    ) -> Result<Vec<(ProviderName, AgentResponse)>, CouncilError> {
        let transcript = self.transcript_json().await?;
        let repo_context = self.build_context(phase, round).await;

        let mut responses = Vec::new();
        for (provider, _) in &self.providers {
            let provider = *provider;
            self.post_system(
                Some(round),
                Some(phase),
                &format!("Running `{provider}` ({phase})"),
            )
            .await?;

            match self
                .run_provider(
                    provider,
                    provider.to_string(),
                    round,
                    phase,
                    &self.prompt,
                    &transcript,
                    &repo_context,
                )
                .await
            {
                Ok(parsed) => {
                    let refs = self
                        .artifacts
                        .persist(&self.issue_id, round, phase, provider.as_str(), &parsed.artifacts)
                        .await?;
                    self.post_comment(
                        Some(round),
                        Some(phase),
                        &format_agent_comment(provider, &parsed, &refs),
                    )
                    .await?;
                    responses.push((provider, parsed));
                }
                Err(e) if e.is_recoverable() => {
                    self.post_system(
                        Some(round),
                        Some(phase),
                        &format!(
                            "Provider failure: `{provider}` ({phase})\n\n```\n{}\n```",
                            e.render()
                        ),
                    )
                    .await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(responses)
    }

    /// One provider invocation through the heartbeat supervisor, then
    /// JSON extraction and normalization.
    #[allow(clippy::too_many_arguments)]
    async fn run_provider(
        &self,
        provider: ProviderName,
        agent_name: String,
        round: u32,
        phase: Phase,
        prompt: &str,
        transcript: &str,
        repo_context: &str,
    ) -> Result<AgentResponse, CouncilError> {
        let implementation = self
            .providers
            .iter()
            .find(|(name, _)| *name == provider)
            .map(|(_, imp)| imp.clone())
            .ok_or_else(|| {
                CouncilError::Configuration(format!("provider `{provider}` is not in the table"))
            })?;

        let request = ProviderRequest {
            agent_name: agent_name.clone(),
            round,
            phase,
            prompt: prompt.to_string(),
            transcript: transcript.to_string(),
            repo_context: repo_context.to_string(),
            timeout: Some(self.config.provider_timeout()),
        };

        self.emit(EngineEvent::ProviderStarted {
            issue_id: self.issue_id.clone(),
            provider,
            agent_name: agent_name.clone(),
            round,
            phase,
        });
        info!(provider = %provider, %phase, round, "provider starting");
        let start = Instant::now();

        let store = self.store.clone();
        let sink = self.on_event.clone();
        let issue_id = self.issue_id.clone();
        let heartbeat = Box::new(move |elapsed: Duration| {
            let store = store.clone();
            let sink = sink.clone();
            let issue_id = issue_id.clone();
            let text = format!(
                "---\n**SYSTEM** `{provider}` still running ({})\n---",
                format_elapsed(elapsed)
            );
            Box::pin(async move {
                match store.add_comment(&issue_id, &text).await {
                    Ok(()) => {
                        if let Some(sink) = &sink {
                            sink(&EngineEvent::CommentPosted {
                                issue_id,
                                round: Some(round),
                                phase: Some(phase),
                                bytes: text.len(),
                            });
                        }
                    }
                    Err(e) => warn!(%phase, "heartbeat comment failed: {e}"),
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        });

        let invocation = async { implementation.invoke(&request).await };
        let raw = supervise(provider.as_str(), self.config.heartbeat(), heartbeat, invocation).await;

        let result = raw
            .map_err(CouncilError::Provider)
            .and_then(|text| parse_agent_response(&text));

        let elapsed = start.elapsed();
        match &result {
            Ok(_) => {
                self.emit(EngineEvent::ProviderFinished {
                    issue_id: self.issue_id.clone(),
                    provider,
                    agent_name,
                    round,
                    phase,
                    elapsed_ms: elapsed.as_millis() as u64,
                    ok: true,
                    error: None,
                });
                info!(provider = %provider, %phase, elapsed = %format_elapsed(elapsed), "provider finished");
            }
            Err(e) => {
                self.emit(EngineEvent::ProviderFinished {
                    issue_id: self.issue_id.clone(),
                    provider,
                    agent_name,
                    round,
                    phase,
                    elapsed_ms: elapsed.as_millis() as u64,
                    ok: false,
                    error: Some(e.render()),
                });
                error!(provider = %provider, %phase, "provider failed: {}", e.render());
            }
        }
        result
    }

    /// Suspend for up to the configured window so a human can inject a
    /// tagged reply. The only blocking point in the engine.
    async fn maybe_wait_for_user(
        &self,
        waits_used: &mut u32,
        round: u32,
        phase: Phase,
        questions: &[String],
    ) -> Result<(), CouncilError> {
        if questions.is_empty()
            || self.config.user_wait_seconds == 0
            || *waits_used >= self.config.max_user_waits
        {
            return Ok(());
        }
        *waits_used += 1;

        self.emit(EngineEvent::WaitingForUser {
            issue_id: self.issue_id.clone(),
            round,
            phase,
            timeout_seconds: self.config.user_wait_seconds,
            waits_used: *waits_used,
            waits_max: self.config.max_user_waits,
            questions: questions.to_vec(),
        });

        let watermark = max_comment_id(&self.store.list_comments(&self.issue_id).await?);

        let mut lines = vec![
            format!(
                "**SYSTEM** Input requested (wait {}s, {}/{})",
                self.config.user_wait_seconds, waits_used, self.config.max_user_waits
            ),
            String::new(),
            format!(
                "Please reply with a Beads comment that starts with `{USER_MARKER}` on the first line, followed by your answer."
            ),
            String::new(),
            "Questions:".to_string(),
        ];
        for q in questions {
            lines.push(format!("- {q}"));
        }
        self.post_comment(
            Some(round),
            Some(phase),
            &format!("---\n{}\n---", lines.join("\n")),
        )
        .await?;

        let deadline = Instant::now() + Duration::from_secs(self.config.user_wait_seconds);
        while Instant::now() < deadline {
            let comments = self.store.list_comments(&self.issue_id).await?;
            if let Some((_, message)) = find_user_reply_since(&comments, watermark) {
                info!(round, %phase, "user reply received");
                self.emit(EngineEvent::UserInputReceived {
                    issue_id: self.issue_id.clone(),
                    round,
                    phase,
                    message,
                });
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(self.config.user_poll_seconds)).await;
        }

        self.post_system(
            Some(round),
            Some(phase),
            &format!(
                "No user response within {}s; continuing.",
                self.config.user_wait_seconds
            ),
        )
        .await?;
        self.emit(EngineEvent::UserInputTimedOut {
            issue_id: self.issue_id.clone(),
            round,
            phase,
            timeout_seconds: self.config.user_wait_seconds,
        });
        Ok(())
    }

    /// Re-fetch the full transcript and serialize it as the shared
    /// conversational context. No caching: staleness is bounded by the
    /// phase cadence, not a cache layer.
    async fn transcript_json(&self) -> Result<String, CouncilError> {
        let comments = self.store.list_comments(&self.issue_id).await?;
        Ok(serde_json::to_string(&comments).unwrap_or_else(|_| "[]".to_string()))
    }

    async fn build_context(&self, phase: Phase, round: u32) -> String {
        if !self.config.repo_context_enabled {
            return String::new();
        }
        let Some(context) = &self.context else {
            return String::new();
        };
        match context.build(&self.prompt, phase, round).await {
            Ok(text) => text,
            Err(e) => {
                warn!(%phase, "repo context failed: {e}");
                String::new()
            }
        }
    }

    async fn post_system(
        &self,
        round: Option<u32>,
        phase: Option<Phase>,
        text: &str,
    ) -> Result<(), CouncilError> {
        self.post_comment(round, phase, &format!("---\n**SYSTEM** {text}\n---"))
            .await
    }

    async fn post_comment(
        &self,
        round: Option<u32>,
        phase: Option<Phase>,
        text: &str,
    ) -> Result<(), CouncilError> {
        self.store.add_comment(&self.issue_id, text).await?;
        self.emit(EngineEvent::CommentPosted {
            issue_id: self.issue_id.clone(),
            round,
            phase,
            bytes: text.len(),
        });
        Ok(())
    }

    fn emit_phase(&self, round: u32, phase: Phase, started: bool) {
        let issue_id = self.issue_id.clone();
        self.emit(if started {
            EngineEvent::PhaseStarted { issue_id, round, phase }
        } else {
            EngineEvent::PhaseFinished { issue_id, round, phase }
        });
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.on_event {
            sink(&event);
        }
    }
}

/// Parse raw provider text: direct JSON first, then first-balanced-object
/// extraction, then normalization. No JSON at all is a provider error;
/// JSON of the wrong shape is a schema error.
pub fn parse_agent_response(raw: &str) -> Result<AgentResponse, CouncilError> {
    let value = try_parse_json(raw)
        .or_else(|| extract_first_json_object(raw))
        .ok_or_else(|| {
            CouncilError::Provider(ProviderFailure::message(format!(
                "provider output contained no JSON object:\n{raw}"
            )))
        })?;
    Ok(normalize(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_wrapped_json() {
        let raw = r#"Here is my answer:
{"agent":"codex","round":1,"phase":"research","message":"hi","chair_score":5,"chair_reason":"ok"}
done"#;
        let resp = parse_agent_response(raw).unwrap();
        assert_eq!(resp.agent, "codex");
        assert_eq!(resp.chair_score, 5.0);
    }

    #[test]
    fn parse_without_json_is_a_provider_error() {
        let err = parse_agent_response("I refuse to answer in JSON").unwrap_err();
        assert!(matches!(err, CouncilError::Provider(_)));
    }

    #[test]
    fn parse_with_wrong_shape_is_a_schema_error() {
        let err = parse_agent_response(r#"{"totally": "unrelated"}"#).unwrap_err();
        assert!(matches!(err, CouncilError::Schema(_)));
    }
}
