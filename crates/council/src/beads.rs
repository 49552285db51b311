//! Bridge to the `bd` (beads) CLI binary — the external comment store.
//!
//! beads is a binary-only tool, so we shell out. The engine only ever
//! appends comments and re-reads the full list; issues are created once by
//! the CLI entrypoint before a session starts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::transcript::{parse_comments, Comment};

/// Append-only transcript access, injectable for tests.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<()>;
    async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedIssue {
    id: Option<String>,
}

/// Shells out to `bd` with an optional explicit database path.
pub struct BeadsCli {
    bin: String,
    db: Option<PathBuf>,
    tmp_dir: PathBuf,
}

impl BeadsCli {
    pub fn new() -> Self {
        Self {
            bin: "bd".to_string(),
            db: std::env::var("COUNCIL_BD_DB").ok().map(PathBuf::from),
            tmp_dir: PathBuf::from(".council/tmp"),
        }
    }

    pub fn with_db(mut self, db: impl Into<PathBuf>) -> Self {
        self.db = Some(db.into());
        self
    }

    fn base_args(&self) -> Vec<String> {
        match &self.db {
            Some(db) => vec!["--db".to_string(), db.display().to_string()],
            None => Vec::new(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let output = Command::new(&self.bin)
            .args(self.base_args())
            .args(args)
            .output()
            .await
            .context("Failed to run `bd`. Is beads installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("bd {} failed: {stderr}", args.first().map(String::as_str).unwrap_or(""));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Create a new issue; returns the store-assigned issue id.
    pub async fn create_issue(
        &self,
        title: &str,
        description: &str,
        labels: &[&str],
        priority: Option<&str>,
    ) -> Result<String> {
        let mut args = vec![
            "create".to_string(),
            title.to_string(),
            "-d".to_string(),
            description.to_string(),
        ];
        if !labels.is_empty() {
            args.push("-l".to_string());
            args.push(labels.join(","));
        }
        if let Some(p) = priority {
            args.push("-p".to_string());
            args.push(p.to_string());
        }
        args.push("--json".to_string());

        let stdout = self.run(&args).await?;
        let created: CreatedIssue =
            serde_json::from_str(&stdout).context("Failed to parse bd create output")?;
        created
            .id
            .with_context(|| format!("bd create did not return an id: {stdout}"))
    }

    /// Raw text listing of an issue's comments, for the `watch` command.
    pub async fn comments_text(&self, issue_id: &str) -> Result<String> {
        self.run(&["comments".to_string(), issue_id.to_string()])
            .await
    }
}

impl Default for BeadsCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommentStore for BeadsCli {
    /// `bd comments add` takes the body from a file; markdown comments are
    /// too shell-hostile to pass as an argument.
    async fn add_comment(&self, issue_id: &str, text: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.tmp_dir.display()))?;
        let tmp_path = unique_tmp_path(&self.tmp_dir);
        tokio::fs::write(&tmp_path, text)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

        let result = self
            .run(&[
                "comments".to_string(),
                "add".to_string(),
                issue_id.to_string(),
                "-f".to_string(),
                tmp_path.display().to_string(),
            ])
            .await;
        let _ = tokio::fs::remove_file(&tmp_path).await;
        result.map(|_| ())
    }

    async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let stdout = self
            .run(&[
                "comments".to_string(),
                issue_id.to_string(),
                "--json".to_string(),
            ])
            .await?;
        let value: serde_json::Value =
            serde_json::from_str(&stdout).context("Failed to parse bd comments output")?;
        Ok(parse_comments(&value))
    }
}

fn unique_tmp_path(dir: &Path) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    dir.join(format!("beads-comment-{}-{nanos}.md", std::process::id()))
}
