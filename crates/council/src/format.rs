//! Markdown rendering of agent responses for the transcript.

use crate::artifacts::ArtifactRef;
use crate::provider::ProviderName;
use crate::schema::AgentResponse;

fn md(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Render one agent response as a transcript comment.
pub fn format_agent_comment(
    provider: ProviderName,
    response: &AgentResponse,
    artifact_refs: &[ArtifactRef],
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(
        "**Agent**: `{}`  **Provider**: `{provider}`",
        md(&response.agent)
    ));
    lines.push(format!(
        "**Round**: `{}`  **Phase**: `{}`",
        response.round, response.phase
    ));
    lines.push(String::new());

    let body = md(&response.message);
    let body = body.trim();
    lines.push(if body.is_empty() {
        "(empty)".to_string()
    } else {
        body.to_string()
    });

    if !response.questions_for_user.is_empty() {
        lines.push(String::new());
        lines.push("**Questions For User**".to_string());
        for q in &response.questions_for_user {
            lines.push(format!("- {}", md(q)));
        }
    }

    if !response.assumptions.is_empty() {
        lines.push(String::new());
        lines.push("**Assumptions**".to_string());
        for a in &response.assumptions {
            lines.push(format!("- {}", md(a)));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "**Chair Score**: `{}` - {}",
        response.chair_score,
        md(&response.chair_reason)
    ));
    lines.push(format!(
        "**Continue?**: `{}` {}",
        if response.need_another_round { "CONTINUE" } else { "DONE" },
        md(&response.why_continue)
    ));

    if !artifact_refs.is_empty() {
        lines.push(String::new());
        lines.push("**Artifacts**".to_string());
        for r in artifact_refs {
            lines.push(format!(
                "- `{}`: {} -> `{}`",
                r.artifact.kind,
                md(&r.artifact.title),
                r.saved_path.display()
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Artifact, Phase};
    use std::path::PathBuf;

    #[test]
    fn comment_includes_all_sections() {
        let response = AgentResponse {
            agent: "claude".into(),
            round: 2,
            phase: Phase::Critique,
            message: "Looks sound overall.".into(),
            questions_for_user: vec!["Which region?".into()],
            assumptions: vec!["us-east-1".into()],
            need_another_round: true,
            why_continue: "open question".into(),
            chair_score: 8.0,
            chair_reason: "thorough".into(),
            artifacts: Vec::new(),
        };
        let refs = vec![ArtifactRef {
            artifact: Artifact {
                kind: "mermaid".into(),
                title: "Flow".into(),
                content: "graph TD".into(),
                mime: None,
                suggested_filename: None,
            },
            saved_path: PathBuf::from(".council/artifacts/x/flow.mmd"),
        }];

        let text = format_agent_comment(ProviderName::Claude, &response, &refs);
        assert!(text.contains("**Agent**: `claude`  **Provider**: `claude`"));
        assert!(text.contains("**Round**: `2`  **Phase**: `critique`"));
        assert!(text.contains("Looks sound overall."));
        assert!(text.contains("**Questions For User**\n- Which region?"));
        assert!(text.contains("**Assumptions**\n- us-east-1"));
        assert!(text.contains("**Continue?**: `CONTINUE` open question"));
        assert!(text.contains("`mermaid`: Flow -> `.council/artifacts/x/flow.mmd`"));
    }

    #[test]
    fn empty_message_renders_placeholder() {
        let response = AgentResponse {
            agent: "codex".into(),
            round: 1,
            phase: Phase::Research,
            message: "   ".into(),
            questions_for_user: Vec::new(),
            assumptions: Vec::new(),
            need_another_round: false,
            why_continue: String::new(),
            chair_score: 5.0,
            chair_reason: String::new(),
            artifacts: Vec::new(),
        };
        let text = format_agent_comment(ProviderName::Codex, &response, &[]);
        assert!(text.contains("(empty)"));
        assert!(text.contains("**Continue?**: `DONE`"));
    }
}
