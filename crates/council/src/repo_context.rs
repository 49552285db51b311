//! Scoped source-code context for provider prompts.
//!
//! Keyword extraction over the user prompt, a ripgrep pass over the repo,
//! and a few lines of excerpt around each match, all clamped to a byte
//! budget. This is deliberately tool-like: providers see it as read-only
//! search output, not as authoritative truth.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use crate::schema::Phase;

/// Seam the engine uses to attach context to prompts; injectable so tests
/// and context-disabled sessions skip the ripgrep machinery entirely.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn build(&self, prompt: &str, phase: Phase, round: u32) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct RepoContextConfig {
    pub budget_bytes: usize,
    pub max_matches: usize,
    pub excerpt_radius_lines: usize,
}

impl Default for RepoContextConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 12_000,
            max_matches: 40,
            excerpt_radius_lines: 2,
        }
    }
}

pub struct RepoContext {
    config: RepoContextConfig,
}

impl RepoContext {
    pub fn new(config: RepoContextConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContextSource for RepoContext {
    async fn build(&self, prompt: &str, phase: Phase, round: u32) -> Result<String> {
        let keywords = extract_keywords(prompt);
        if keywords.is_empty() || self.config.budget_bytes == 0 || self.config.max_matches == 0 {
            return Ok(String::new());
        }

        let root = repo_root().await;
        let matches = ripgrep_matches(&root, &keywords, self.config.max_matches).await;

        let mut blocks: Vec<String> = vec![
            "=== Repo Context (scoped, tool-like) ===".to_string(),
            format!("keywords: {}", keywords.join(", ")),
            format!("phase: {phase}  round: {round}"),
            String::new(),
        ];

        let mut used = 0usize;
        let mut refs = 0usize;
        for (rel, line) in &matches {
            let snippet =
                excerpt(&root.join(rel), *line, self.config.excerpt_radius_lines).await;
            if snippet.is_empty() {
                continue;
            }
            let block = format!("---\n{rel}:{line}\n---\n{snippet}");
            let next = block.len() + 2;
            if used + next > self.config.budget_bytes {
                break;
            }
            used += next;
            refs += 1;
            blocks.push(block);
            blocks.push(String::new());
        }

        let text = clamp_bytes(blocks.join("\n").trim().to_string(), self.config.budget_bytes);
        tracing::debug!(
            keywords = keywords.len(),
            refs,
            bytes = text.len(),
            "repo context built"
        );
        Ok(text)
    }
}

const STOPWORDS: [&str; 35] = [
    "the", "and", "for", "with", "this", "that", "from", "into", "your", "you", "are", "was",
    "were", "will", "would", "could", "should", "have", "has", "had", "how", "what", "why",
    "when", "where", "which", "can", "cant", "not", "use", "using", "make", "build", "about",
    "them",
];

/// Up to eight distinct lowercase keywords, four characters or longer,
/// stopwords removed, in prompt order.
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in prompt
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
    {
        if word.len() < 4 || STOPWORDS.contains(&word) {
            continue;
        }
        if out.iter().any(|w| w == word) {
            continue;
        }
        out.push(word.to_string());
        if out.len() >= 8 {
            break;
        }
    }
    out
}

async fn repo_root() -> PathBuf {
    let fallback = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            let root = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if root.is_empty() {
                fallback()
            } else {
                PathBuf::from(root)
            }
        }
        _ => fallback(),
    }
}

async fn ripgrep_matches(root: &Path, keywords: &[String], max: usize) -> Vec<(String, usize)> {
    let query = if keywords.len() == 1 {
        keywords[0].clone()
    } else {
        format!("({})", keywords.join("|"))
    };
    let args = [
        "--no-heading",
        "--color",
        "never",
        "-n",
        "-S",
        "--glob",
        "!target/**",
        "--glob",
        "!.council/**",
        "--glob",
        "!node_modules/**",
        &query,
        ".",
    ];

    // rg exits 1 on zero matches; both paths reduce to "whatever stdout
    // we got", possibly empty.
    let stdout = match Command::new("rg")
        .args(args)
        .current_dir(root)
        .output()
        .await
    {
        Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Err(_) => String::new(),
    };

    stdout
        .lines()
        .filter_map(parse_match_line)
        .take(max)
        .collect()
}

/// Parse one `path:line:text` ripgrep line.
fn parse_match_line(line: &str) -> Option<(String, usize)> {
    let line = line.trim();
    let first = line.find(':')?;
    let rest = &line[first + 1..];
    let second = rest.find(':')?;
    let number: usize = rest[..second].parse().ok()?;
    if number == 0 {
        return None;
    }
    Some((line[..first].to_string(), number))
}

async fn excerpt(path: &Path, line: usize, radius: usize) -> String {
    let Ok(raw) = tokio::fs::read_to_string(path).await else {
        return String::new();
    };
    let normalized = raw.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let center = line.max(1);
    let start = center.saturating_sub(radius).max(1);
    let end = (center + radius).min(lines.len());
    let mut out = Vec::with_capacity(end - start + 1);
    for i in start..=end {
        out.push(format!("{i:>4}: {}", lines.get(i - 1).unwrap_or(&"")));
    }
    out.join("\n")
}

fn clamp_bytes(text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n[context truncated]\n", text[..end].trim_end())
}
