//! Council error taxonomy.
//!
//! Two of these are recoverable at the phase level and two are fatal:
//!
//! | Variant          | Scope                         | Recovery              |
//! |------------------|-------------------------------|-----------------------|
//! | `Provider`       | one provider invocation       | skip, next provider   |
//! | `Schema`         | one provider's output shape   | skip, next provider   |
//! | `PhaseExhausted` | every provider in a phase     | abort session         |
//! | `Configuration`  | caller-supplied parameters    | abort before start    |
//! | `Store`          | beads transcript plumbing     | abort session         |

use std::fmt;

use thiserror::Error;

use crate::schema::Phase;

/// Loosely-typed record describing a failed provider invocation.
///
/// Providers are external CLI processes; what comes back on failure is a
/// grab-bag of a short message, a full message, and captured stderr/stdout.
/// `render` concatenates whichever of those are non-empty, in that priority
/// order, so transcript comments always carry the most useful text first.
#[derive(Debug, Clone, Default)]
pub struct ProviderFailure {
    pub short: Option<String>,
    pub message: Option<String>,
    pub stderr: Option<String>,
    pub stdout: Option<String>,
}

impl ProviderFailure {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }

    /// Build a failure from a finished process's captured streams.
    pub fn from_process(short: impl Into<String>, stderr: &str, stdout: &str) -> Self {
        Self {
            short: Some(short.into()),
            message: None,
            stderr: (!stderr.trim().is_empty()).then(|| stderr.to_string()),
            stdout: (!stdout.trim().is_empty()).then(|| stdout.to_string()),
        }
    }

    /// Ordered chain: short message, full message, stderr, stdout.
    ///
    /// Each source is included only when non-empty; stderr/stdout get a
    /// labelled prefix so the transcript stays readable.
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(s) = self.short.as_deref() {
            if !s.trim().is_empty() {
                parts.push(s.to_string());
            }
        }
        if let Some(m) = self.message.as_deref() {
            if !m.trim().is_empty() {
                parts.push(m.to_string());
            }
        }
        if let Some(e) = self.stderr.as_deref() {
            if !e.trim().is_empty() {
                parts.push(format!("stderr:\n{e}"));
            }
        }
        if let Some(o) = self.stdout.as_deref() {
            if !o.trim().is_empty() {
                parts.push(format!("stdout:\n{o}"));
            }
        }
        if parts.is_empty() {
            "unknown provider error".to_string()
        } else {
            parts.join("\n\n").trim().to_string()
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Output parsed as JSON but matched neither known response shape.
#[derive(Debug, Clone, Error)]
#[error("agent response did not match the expected shape: {0}")]
pub struct SchemaError(pub String);

/// Unified error type for the council engine.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// A single provider invocation failed (spawn, timeout, non-zero exit,
    /// or non-JSON output). Recoverable: the phase skips to the next one.
    #[error("provider failure: {0}")]
    Provider(ProviderFailure),

    /// Provider output was JSON but failed normalization. Treated exactly
    /// like `Provider` at call sites.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Every provider (or synthesis candidate) in a phase failed. Fatal.
    #[error("all providers failed in {phase} phase")]
    PhaseExhausted { phase: Phase },

    /// Invalid caller-supplied parameters. Fails before any session state.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The beads transcript could not be read or appended.
    #[error("comment store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl CouncilError {
    /// Whether the phase loop may absorb this error and move on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Schema(_))
    }

    /// Text suitable for a transcript failure comment.
    pub fn render(&self) -> String {
        match self {
            Self::Provider(f) => f.render(),
            other => other.to_string(),
        }
    }
}
