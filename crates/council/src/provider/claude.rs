//! Claude CLI invoker. Takes the JSON schema inline and prints the answer
//! to stdout; tools are disabled for a pure text-in/text-out call.

use async_trait::async_trait;

use super::{build_prompt, run_cli, Provider, ProviderRequest};
use crate::errors::ProviderFailure;
use crate::schema::agent_response_schema_string;

pub struct ClaudeCli;

impl ClaudeCli {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ClaudeCli {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderFailure> {
        let args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
            "--tools".to_string(),
            String::new(),
            "--json-schema".to_string(),
            agent_response_schema_string(),
            build_prompt(request, &[]),
        ];
        let output = run_cli("claude", &args, request.timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
