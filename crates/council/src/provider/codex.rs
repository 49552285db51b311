//! Codex CLI invoker.
//!
//! Codex takes the output schema as a file and writes its final message to
//! a file of our choosing, which survives even when stdout is polluted by
//! progress noise.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{build_prompt, run_cli, Provider, ProviderRequest};
use crate::errors::ProviderFailure;
use crate::schema::agent_response_schema_string;

pub struct CodexCli {
    schema_path: PathBuf,
    tmp_dir: PathBuf,
}

impl CodexCli {
    pub fn new() -> Self {
        Self {
            schema_path: PathBuf::from(".council/schema/agent_response.schema.json"),
            tmp_dir: PathBuf::from(".council/tmp"),
        }
    }
}

impl Default for CodexCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for CodexCli {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderFailure> {
        if let Some(dir) = self.schema_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ProviderFailure::message(format!("failed to create {}: {e}", dir.display())))?;
        }
        tokio::fs::write(&self.schema_path, agent_response_schema_string())
            .await
            .map_err(|e| ProviderFailure::message(format!("failed to write schema file: {e}")))?;
        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .map_err(|e| ProviderFailure::message(format!("failed to create tmp dir: {e}")))?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let last_message = self.tmp_dir.join(format!("codex-last-{nanos}.txt"));

        let full_prompt = build_prompt(
            request,
            &[
                "Important: Always include \"why_continue\" (use \"\" if none).",
                "Important: Every artifact MUST include \"mime\" and \"suggested_filename\" (use \"\" if unknown).",
            ],
        );

        let args = vec![
            "exec".to_string(),
            "--sandbox".to_string(),
            "read-only".to_string(),
            "--output-schema".to_string(),
            self.schema_path.display().to_string(),
            "--output-last-message".to_string(),
            last_message.display().to_string(),
            "--skip-git-repo-check".to_string(),
            full_prompt,
        ];

        let output = run_cli("codex", &args, request.timeout).await?;

        // Prefer the dedicated last-message file; fall back to stdout.
        let raw = match tokio::fs::read_to_string(&last_message).await {
            Ok(text) => text,
            Err(_) => String::from_utf8_lossy(&output.stdout).into_owned(),
        };
        let _ = tokio::fs::remove_file(&last_message).await;
        Ok(raw.trim().to_string())
    }
}
