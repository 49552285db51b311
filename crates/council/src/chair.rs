//! Chair selection: who leads critique and synthesis for a round.
//!
//! Selection is deterministic. Responses arrive in provider enumeration
//! order and the sort is stable, so score ties resolve to the earlier
//! provider in the enumeration.

use crate::provider::ProviderName;
use crate::schema::AgentResponse;

/// Pick the chair from the providers that produced a research response.
///
/// Highest `chair_score` wins; ties break by enumeration order. The
/// `Codex` fallback is only reachable when the caller proceeds despite
/// total research failure, which the engine normally treats as fatal.
pub fn pick_chair(responses: &[(ProviderName, AgentResponse)]) -> ProviderName {
    let mut ranked: Vec<&(ProviderName, AgentResponse)> = responses.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.chair_score
            .partial_cmp(&a.1.chair_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .first()
        .map(|(provider, _)| *provider)
        .unwrap_or(ProviderName::Codex)
}

/// Candidate order for synthesis: the research chair first, then the
/// critique providers by score descending, deduplicated. The engine tries
/// these in order until one succeeds.
pub fn synthesis_candidates(
    chair: ProviderName,
    critique_responses: &[(ProviderName, AgentResponse)],
) -> Vec<ProviderName> {
    let mut ranked: Vec<&(ProviderName, AgentResponse)> = critique_responses.iter().collect();
    ranked.sort_by(|a, b| {
        b.1.chair_score
            .partial_cmp(&a.1.chair_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut candidates = vec![chair];
    for (provider, _) in ranked {
        if !candidates.contains(provider) {
            candidates.push(*provider);
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Phase;

    fn response(provider: ProviderName, score: f64) -> (ProviderName, AgentResponse) {
        (
            provider,
            AgentResponse {
                agent: provider.to_string(),
                round: 1,
                phase: Phase::Research,
                message: String::new(),
                questions_for_user: Vec::new(),
                assumptions: Vec::new(),
                need_another_round: false,
                why_continue: String::new(),
                chair_score: score,
                chair_reason: String::new(),
                artifacts: Vec::new(),
            },
        )
    }

    #[test]
    fn highest_score_wins() {
        let responses = vec![
            response(ProviderName::Codex, 4.0),
            response(ProviderName::Claude, 8.0),
            response(ProviderName::Gemini, 6.0),
        ];
        assert_eq!(pick_chair(&responses), ProviderName::Claude);
    }

    #[test]
    fn ties_break_by_enumeration_order() {
        // Scores [7, 9, 9] for [codex, claude, gemini] — claude is the
        // first maximum in enumeration order.
        let responses = vec![
            response(ProviderName::Codex, 7.0),
            response(ProviderName::Claude, 9.0),
            response(ProviderName::Gemini, 9.0),
        ];
        assert_eq!(pick_chair(&responses), ProviderName::Claude);
    }

    #[test]
    fn empty_falls_back_to_codex() {
        assert_eq!(pick_chair(&[]), ProviderName::Codex);
    }

    #[test]
    fn synthesis_order_puts_chair_first_and_dedupes() {
        let critique = vec![
            response(ProviderName::Codex, 3.0),
            response(ProviderName::Claude, 9.0),
            response(ProviderName::Gemini, 5.0),
        ];
        assert_eq!(
            synthesis_candidates(ProviderName::Gemini, &critique),
            vec![ProviderName::Gemini, ProviderName::Claude, ProviderName::Codex]
        );
    }

    #[test]
    fn synthesis_handles_chair_missing_from_critique() {
        let critique = vec![response(ProviderName::Claude, 2.0)];
        assert_eq!(
            synthesis_candidates(ProviderName::Codex, &critique),
            vec![ProviderName::Codex, ProviderName::Claude]
        );
    }
}
