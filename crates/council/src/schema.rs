//! Canonical agent response shape and the normalization layer.
//!
//! Providers return JSON of wildly varying quality. Normalization is a pure
//! function over a decoded `serde_json::Value` that:
//!
//! 1. Coerces loosely-typed fields (string-or-list, numeric strings,
//!    truthy words) into their canonical types.
//! 2. Validates against the current (v2, `message`-based) shape.
//! 3. Falls back to the legacy (v1, `summary`/`recommendations`-based)
//!    shape and converts it explicitly.
//! 4. Fails with the v2 error — the more useful one for prompt debugging.
//!
//! The leniency here is deliberate: malformed artifacts are dropped and
//! loose scalars coerced rather than rejecting the whole response, because
//! LLM output is unreliable and a partial answer beats a dead provider.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchemaError;

/// The stage within a round, plus the standalone `oracle` tag used for
/// out-of-band single-shot invocations (planning). `oracle` never appears
/// in the round loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Research,
    Critique,
    Synthesis,
    Oracle,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Critique => write!(f, "critique"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Oracle => write!(f, "oracle"),
        }
    }
}

/// A named, typed content blob produced alongside a structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// Logical type, e.g. `"mermaid"`, `"markdown-plan"`. Non-empty after
    /// normalization (entries failing this are dropped, not rejected).
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_filename: Option<String>,
}

/// The canonical unit of provider output (current, v2 shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentResponse {
    pub agent: String,
    pub round: u32,
    pub phase: Phase,
    /// Free-text discussion. Supersedes the legacy summary/recommendations/
    /// risks/open_questions quartet.
    pub message: String,
    /// Non-empty signals a desire to pause for human input.
    #[serde(default)]
    pub questions_for_user: Vec<String>,
    /// Recorded when the agent proceeds without answers.
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub need_another_round: bool,
    #[serde(default)]
    pub why_continue: String,
    /// Confidence in [0,10], used purely for chair ranking.
    #[serde(default)]
    pub chair_score: f64,
    #[serde(default)]
    pub chair_reason: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// Legacy (v1) shape, kept only for conversion.
#[derive(Debug, Clone, Deserialize)]
struct LegacyAgentResponse {
    agent: String,
    round: u32,
    phase: Phase,
    summary: String,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    open_questions: Vec<String>,
    #[serde(default)]
    need_another_round: bool,
    #[serde(default)]
    why_continue: String,
    #[serde(default)]
    chair_score: f64,
    #[serde(default)]
    chair_reason: String,
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

impl LegacyAgentResponse {
    fn into_current(self) -> AgentResponse {
        let mut message = self.summary.trim_end().to_string();
        for (label, items) in [
            ("Recommendations:", &self.recommendations),
            ("Risks:", &self.risks),
            ("Open Questions:", &self.open_questions),
        ] {
            if items.is_empty() {
                continue;
            }
            message.push_str("\n\n");
            message.push_str(label);
            for item in items {
                message.push_str("\n- ");
                message.push_str(item);
            }
        }
        AgentResponse {
            agent: self.agent,
            round: self.round,
            phase: self.phase,
            message,
            questions_for_user: Vec::new(),
            assumptions: Vec::new(),
            need_another_round: self.need_another_round,
            why_continue: self.why_continue,
            chair_score: self.chair_score,
            chair_reason: self.chair_reason,
            artifacts: self.artifacts,
        }
    }
}

/// Inline JSON Schema for the current response shape, handed to provider
/// CLIs that accept an output schema.
pub fn agent_response_schema_string() -> String {
    let schema = schemars::schema_for!(AgentResponse);
    serde_json::to_string(&schema).unwrap_or_else(|_| "{}".to_string())
}

const LIST_OR_STRING_FIELDS: [&str; 5] = [
    "recommendations",
    "risks",
    "open_questions",
    "questions_for_user",
    "assumptions",
];

/// Normalize arbitrary decoded JSON into a canonical `AgentResponse`.
///
/// Pure function; see the module docs for the coercion/fallback policy.
pub fn normalize(value: Value) -> Result<AgentResponse, SchemaError> {
    let coerced = coerce(value);

    let v2_err = match serde_json::from_value::<AgentResponse>(coerced.clone()) {
        Ok(mut resp) => {
            resp.chair_score = resp.chair_score.clamp(0.0, 10.0);
            validate(&resp)?;
            return Ok(resp);
        }
        Err(e) => e,
    };

    if let Ok(legacy) = serde_json::from_value::<LegacyAgentResponse>(coerced) {
        let mut resp = legacy.into_current();
        resp.chair_score = resp.chair_score.clamp(0.0, 10.0);
        validate(&resp)?;
        return Ok(resp);
    }

    Err(SchemaError(v2_err.to_string()))
}

fn validate(resp: &AgentResponse) -> Result<(), SchemaError> {
    if resp.agent.trim().is_empty() {
        return Err(SchemaError("agent must be a non-empty string".into()));
    }
    if resp.round == 0 {
        return Err(SchemaError("round must be a positive integer".into()));
    }
    Ok(())
}

fn coerce(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    for field in LIST_OR_STRING_FIELDS {
        if let Some(v) = map.get(field) {
            let coerced = coerce_string_list(v);
            map.insert(field.to_string(), Value::Array(coerced.into_iter().map(Value::String).collect()));
        }
    }

    if let Some(v) = map.get("chair_score") {
        let score = coerce_score(v);
        if let Some(n) = serde_json::Number::from_f64(score) {
            map.insert("chair_score".to_string(), Value::Number(n));
        }
    }

    if let Some(v) = map.get("need_another_round") {
        map.insert(
            "need_another_round".to_string(),
            Value::Bool(coerce_flag(v)),
        );
    }

    if let Some(Value::Array(items)) = map.remove("artifacts") {
        let kept: Vec<Value> = items.into_iter().filter_map(coerce_artifact).collect();
        map.insert("artifacts".to_string(), Value::Array(kept));
    }

    Value::Object(map)
}

/// Accept a list of strings or a single string. A single string is split
/// into bullet lines (`-`/`*` markers stripped); with no bullet lines the
/// whole string becomes a one-element list.
fn coerce_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::String(s) => split_bullets(s),
        other => scalar_to_string(other).map(|s| vec![s]).unwrap_or_default(),
    }
}

fn split_bullets(text: &str) -> Vec<String> {
    let bullets: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix('-'))
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix('*'))
                .map(|rest| rest.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect();
    if !bullets.is_empty() {
        return bullets;
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

/// Number, or a numeric string; anything else falls back to 0. Always
/// clamped into [0,10].
fn coerce_score(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() {
        raw.clamp(0.0, 10.0)
    } else {
        0.0
    }
}

/// Bool, or a recognized truthy/falsy word; anything else is `false`.
fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "continue" | "cont"
        ),
        _ => false,
    }
}

/// String-coerce an artifact's scalar fields; drop the entry entirely when
/// `type` or `title` ends up empty, or when it is not an object at all.
fn coerce_artifact(value: Value) -> Option<Value> {
    let Value::Object(mut map) = value else {
        return None;
    };
    for field in ["type", "title", "content", "mime", "suggested_filename"] {
        if let Some(v) = map.get(field) {
            match scalar_to_string(v) {
                Some(s) => {
                    map.insert(field.to_string(), Value::String(s));
                }
                None => {
                    map.remove(field);
                }
            }
        }
    }
    let non_empty = |field: &str| {
        map.get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };
    if !non_empty("type") || !non_empty("title") {
        return None;
    }
    Some(Value::Object(map))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
