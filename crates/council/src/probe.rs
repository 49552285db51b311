//! Provider probe: a cheap end-to-end health check per provider.
//!
//! Each provider gets a trivial prompt and must come back with a JSON
//! object that survives normalization. Probes run sequentially so the
//! output reads as a checklist and a wedged CLI can't starve the others
//! of terminal output.

use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::engine::parse_agent_response;
use crate::provider::{ProviderRequest, ProviderTable};
use crate::schema::Phase;

#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub provider: String,
    pub ok: bool,
    pub elapsed_ms: u64,
    /// Agent name echoed back on success, rendered error on failure.
    pub detail: String,
}

const PROBE_PROMPT: &str =
    "This is a connectivity probe. Reply with a minimal valid response: \
     message=\"ok\", chair_score=0, need_another_round=false.";

/// Probe every provider in table order.
pub async fn probe_providers(table: &ProviderTable, timeout: Duration) -> Vec<ProbeReport> {
    let mut reports = Vec::with_capacity(table.len());
    for (name, implementation) in table {
        let request = ProviderRequest {
            agent_name: name.to_string(),
            round: 1,
            phase: Phase::Research,
            prompt: PROBE_PROMPT.to_string(),
            transcript: "[]".to_string(),
            repo_context: String::new(),
            timeout: Some(timeout),
        };

        info!(provider = %name, "probing");
        let start = Instant::now();
        let outcome = implementation
            .invoke(&request)
            .await
            .map_err(crate::errors::CouncilError::Provider)
            .and_then(|raw| parse_agent_response(&raw));
        let elapsed_ms = start.elapsed().as_millis() as u64;

        reports.push(match outcome {
            Ok(parsed) => ProbeReport {
                provider: name.to_string(),
                ok: true,
                elapsed_ms,
                detail: format!("agent `{}` responded", parsed.agent),
            },
            Err(e) => ProbeReport {
                provider: name.to_string(),
                ok: false,
                elapsed_ms,
                detail: e.render(),
            },
        });
    }
    reports
}
