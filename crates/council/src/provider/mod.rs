//! Provider adapter contract and the fixed provider enumeration.
//!
//! Each provider is a stateless external CLI agent; all conversational
//! state travels through the transcript string handed into every call.
//! The table of implementations is injected at engine construction — it
//! looks global but is just a closed map, which keeps it swappable in
//! tests.

pub mod claude;
pub mod codex;
pub mod gemini;
pub mod profiles;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::errors::ProviderFailure;
use crate::schema::Phase;

/// Closed set of council providers. Enumeration order is load-bearing:
/// it fixes fan-out order and breaks chair-score ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Codex,
    Claude,
    Gemini,
}

impl ProviderName {
    pub const ALL: [ProviderName; 3] = [Self::Codex, Self::Claude, Self::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to one provider invocation.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub agent_name: String,
    pub round: u32,
    pub phase: Phase,
    pub prompt: String,
    /// Full transcript JSON, the shared conversational context.
    pub transcript: String,
    pub repo_context: String,
    pub timeout: Option<Duration>,
}

/// The abstract operation each provider implementation must satisfy.
///
/// Returns raw text expected to contain one JSON object; extraction and
/// normalization happen on the engine side.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderFailure>;
}

/// Ordered provider table: enumeration order, injectable implementations.
pub type ProviderTable = Vec<(ProviderName, Arc<dyn Provider>)>;

/// The real table: codex, claude, gemini CLI invokers in enumeration order.
pub fn default_table() -> ProviderTable {
    vec![
        (ProviderName::Codex, Arc::new(codex::CodexCli::new()) as Arc<dyn Provider>),
        (ProviderName::Claude, Arc::new(claude::ClaudeCli::new())),
        (ProviderName::Gemini, Arc::new(gemini::GeminiCli::new())),
    ]
}

/// Shared prompt assembly: role header, pinned identity fields, optional
/// extra instructions, then the user prompt, scoped repo context, and the
/// transcript.
pub(crate) fn build_prompt(request: &ProviderRequest, extra: &[&str]) -> String {
    let mut lines: Vec<String> = vec![
        format!("You are council agent: {}.", request.agent_name),
        "Return ONLY valid JSON matching the provided JSON Schema.".to_string(),
        format!(
            "Set: agent=\"{}\", round={}, phase=\"{}\".",
            request.agent_name, request.round, request.phase
        ),
    ];
    for line in extra {
        lines.push((*line).to_string());
    }
    lines.push(String::new());
    lines.push(profiles::profiles_for_prompt());
    lines.push(String::new());
    lines.push("=== User Prompt ===".to_string());
    lines.push(request.prompt.clone());
    if !request.repo_context.trim().is_empty() {
        lines.push(String::new());
        lines.push("=== Repo Context (scoped) ===".to_string());
        lines.push(request.repo_context.clone());
    }
    lines.push(String::new());
    lines.push("=== Beads Transcript (for context) ===".to_string());
    lines.push(request.transcript.clone());
    lines.push(String::new());
    lines.push("Output JSON only.".to_string());
    lines.join("\n")
}

/// Run one provider binary to completion, with an optional hard timeout.
///
/// Timeout expiry takes the same failure path as any other provider error.
pub(crate) async fn run_cli(
    bin: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<std::process::Output, ProviderFailure> {
    let fut = Command::new(bin).args(args).kill_on_drop(true).output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            ProviderFailure::message(format!("{bin} timed out after {}s", limit.as_secs()))
        })?,
        None => fut.await,
    }
    .map_err(|e| ProviderFailure::message(format!("failed to spawn {bin}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Err(ProviderFailure::from_process(
            format!("{bin} exited with {}", output.status),
            &stderr,
            &stdout,
        ));
    }
    Ok(output)
}
