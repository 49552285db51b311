//! Artifact persistence: content blobs in, saved references out.
//!
//! Artifacts land under
//! `.council/artifacts/<issue>/round-<n>/<phase>/<agent>/` with sanitized
//! filenames. Once written, ownership conceptually transfers to the
//! filesystem; the engine keeps only the saved path for display.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::schema::{Artifact, Phase};

/// A persisted artifact and where it landed.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub artifact: Artifact,
    pub saved_path: PathBuf,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn persist(
        &self,
        issue_id: &str,
        round: u32,
        phase: Phase,
        agent_name: &str,
        artifacts: &[Artifact],
    ) -> Result<Vec<ArtifactRef>>;
}

/// Filesystem-backed store rooted at a base directory.
pub struct FsArtifactStore {
    base: PathBuf,
}

impl FsArtifactStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for FsArtifactStore {
    fn default() -> Self {
        Self::new(".council/artifacts")
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn persist(
        &self,
        issue_id: &str,
        round: u32,
        phase: Phase,
        agent_name: &str,
        artifacts: &[Artifact],
    ) -> Result<Vec<ArtifactRef>> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self
            .base
            .join(sanitize_filename(issue_id))
            .join(format!("round-{round}"))
            .join(phase.to_string())
            .join(sanitize_filename(agent_name));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut refs = Vec::with_capacity(artifacts.len());
        for (index, artifact) in artifacts.iter().enumerate() {
            let path = dir.join(artifact_filename(artifact, index));
            tokio::fs::write(&path, &artifact.content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            refs.push(ArtifactRef {
                artifact: artifact.clone(),
                saved_path: path,
            });
        }
        Ok(refs)
    }
}

fn artifact_filename(artifact: &Artifact, index: usize) -> String {
    let suggested = artifact
        .suggested_filename
        .as_deref()
        .map(sanitize_filename)
        .unwrap_or_default();
    if !suggested.is_empty() {
        // A suggested name that already carries an extension is used as-is.
        if Path::new(&suggested).extension().is_some() {
            return suggested;
        }
        return format!("{suggested}.{}", default_extension(&artifact.kind));
    }

    let title = sanitize_filename(&artifact.title);
    let stem = if title.is_empty() { "artifact".to_string() } else { title };
    format!(
        "{:02}-{stem}.{}",
        index + 1,
        default_extension(&artifact.kind)
    )
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            last_dash = ch == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');
    trimmed.chars().take(80).collect()
}

fn default_extension(kind: &str) -> &'static str {
    let k = kind.to_lowercase();
    if k.contains("mermaid") {
        "mmd"
    } else if k.contains("markdown") {
        "md"
    } else if k.contains("json") {
        "json"
    } else if k.contains("svg") {
        "svg"
    } else if k.contains("html") {
        "html"
    } else {
        "txt"
    }
}
