//! Gemini CLI invoker. No schema flag exists, so the required keys are
//! spelled out in the prompt instead.

use async_trait::async_trait;

use super::{build_prompt, run_cli, Provider, ProviderRequest};
use crate::errors::ProviderFailure;

pub struct GeminiCli;

impl GeminiCli {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GeminiCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for GeminiCli {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderFailure> {
        let full_prompt = build_prompt(
            request,
            &["JSON must have keys: agent, round, phase, message, questions_for_user, \
               assumptions, need_another_round, why_continue, chair_score, chair_reason, artifacts."],
        );
        let args = vec![
            "--output-format".to_string(),
            "text".to_string(),
            "--sandbox".to_string(),
            full_prompt,
        ];
        let output = run_cli("gemini", &args, request.timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
