//! One-way progress feed emitted by the engine.
//!
//! Events are consumed by observers (CLI progress lines, an external
//! viewer) and are never read back into engine logic — a single synchronous
//! callback at well-defined points, not a pub/sub bus.

use serde::{Deserialize, Serialize};

use crate::provider::ProviderName;
use crate::schema::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    PhaseStarted {
        issue_id: String,
        round: u32,
        phase: Phase,
    },
    PhaseFinished {
        issue_id: String,
        round: u32,
        phase: Phase,
    },
    ProviderStarted {
        issue_id: String,
        provider: ProviderName,
        agent_name: String,
        round: u32,
        phase: Phase,
    },
    ProviderFinished {
        issue_id: String,
        provider: ProviderName,
        agent_name: String,
        round: u32,
        phase: Phase,
        elapsed_ms: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    WaitingForUser {
        issue_id: String,
        round: u32,
        phase: Phase,
        timeout_seconds: u64,
        waits_used: u32,
        waits_max: u32,
        questions: Vec<String>,
    },
    UserInputReceived {
        issue_id: String,
        round: u32,
        phase: Phase,
        message: String,
    },
    UserInputTimedOut {
        issue_id: String,
        round: u32,
        phase: Phase,
        timeout_seconds: u64,
    },
    CommentPosted {
        issue_id: String,
        round: Option<u32>,
        phase: Option<Phase>,
        bytes: usize,
    },
}

/// Observer callback. Invoked synchronously; observers must not block.
pub type EventSink = dyn Fn(&EngineEvent) + Send + Sync;
