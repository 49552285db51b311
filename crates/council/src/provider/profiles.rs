//! Static provider capability profiles, injected into every prompt so the
//! agents can route work to each other deliberately.

use super::ProviderName;

pub struct ProviderProfile {
    pub name: ProviderName,
    pub strengths: &'static [&'static str],
    pub best_for: &'static [&'static str],
    pub ask_others_for: &'static [&'static str],
}

pub const PROFILES: [ProviderProfile; 3] = [
    ProviderProfile {
        name: ProviderName::Codex,
        strengths: &[
            "Codebase-aware reasoning and implementation planning",
            "Safe automation mindset (sandbox/approvals), operational rigor",
            "Structured outputs and repeatable workflows",
        ],
        best_for: &[
            "Turning ideas into executable steps",
            "Tool/CLI orchestration constraints",
            "Catching integration pitfalls",
        ],
        ask_others_for: &[
            "Web-grounded facts (ask Gemini)",
            "Writing/critique polish (ask Claude)",
        ],
    },
    ProviderProfile {
        name: ProviderName::Claude,
        strengths: &[
            "Careful reasoning and critique",
            "Clarifying requirements and surfacing assumptions",
            "Architecture/API review clarity",
        ],
        best_for: &[
            "Spec/PRD shaping",
            "Identifying edge cases",
            "Reviewing plans for coherence and risk",
        ],
        ask_others_for: &[
            "Web-grounded facts (ask Gemini)",
            "Concrete CLI execution constraints (ask Codex)",
        ],
    },
    ProviderProfile {
        name: ProviderName::Gemini,
        strengths: &[
            "Web-grounded research (search grounding)",
            "Large-context synthesis",
            "Artifacts like diagrams or structured plans",
        ],
        best_for: &[
            "Research with citations/links",
            "Summarizing large docs",
            "Creating diagrams/flowcharts for others to critique",
        ],
        ask_others_for: &["Implementation feasibility and safety checks (ask Codex/Claude)"],
    },
];

pub fn profiles_for_prompt() -> String {
    let mut lines = vec!["Provider profiles (use these to coordinate):".to_string()];
    for p in &PROFILES {
        lines.push(format!("- {}:", p.name));
        lines.push(format!("  - Strengths: {}", p.strengths.join("; ")));
        lines.push(format!("  - Best for: {}", p.best_for.join("; ")));
        lines.push(format!("  - Ask others for: {}", p.ask_others_for.join("; ")));
    }
    lines.join("\n")
}
