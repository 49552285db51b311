//! Transcript comment parsing and the user-reply convention.
//!
//! The transcript is the ordered comment list on the session's beads issue.
//! It is append-only and re-fetched in full on every read; nothing here
//! caches. Comment ids are store-assigned, monotonically increasing
//! integers, which is what makes the interjection watermark work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First line of a comment that a human uses to answer council questions.
pub const USER_MARKER: &str = "**USER**";

/// One transcript comment as returned by `bd comments --json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Lenient decode of a comment list: non-array input yields an empty list,
/// entries without an integer `id` and string `text` are skipped.
pub fn parse_comments(value: &Value) -> Vec<Comment> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let id = obj.get("id")?.as_i64()?;
            let text = obj.get("text")?.as_str()?.to_string();
            Some(Comment {
                id,
                text,
                author: obj.get("author").and_then(Value::as_str).map(String::from),
                issue_id: obj.get("issue_id").and_then(Value::as_str).map(String::from),
                created_at: obj
                    .get("created_at")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok()),
            })
        })
        .collect()
}

/// Highest comment id seen so far (0 for an empty transcript).
pub fn max_comment_id(comments: &[Comment]) -> i64 {
    comments.iter().map(|c| c.id).max().unwrap_or(0)
}

/// Extract the message body from a `**USER**`-tagged comment.
///
/// The first line must contain the marker; everything after it, trimmed,
/// is the message. Returns `None` for untagged or empty comments.
pub fn extract_user_message(text: &str) -> Option<String> {
    let normalized = text.replace("\r\n", "\n");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut lines = trimmed.lines();
    if !lines.next()?.contains(USER_MARKER) {
        return None;
    }
    Some(lines.collect::<Vec<_>>().join("\n").trim().to_string())
}

/// First tagged user reply with id strictly greater than the watermark.
pub fn find_user_reply_since(comments: &[Comment], after_id: i64) -> Option<(i64, String)> {
    comments.iter().find_map(|c| {
        if c.id <= after_id {
            return None;
        }
        extract_user_message(&c.text).map(|msg| (c.id, msg))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_skips_malformed_entries() {
        let raw = json!([
            {"id": 1, "text": "first"},
            {"id": "not-a-number", "text": "skipped"},
            {"text": "no id"},
            {"id": 3, "text": "third", "author": "alice", "created_at": "2026-08-30T10:00:00Z"},
            "not an object"
        ]);
        let comments = parse_comments(&raw);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, 1);
        assert_eq!(comments[1].author.as_deref(), Some("alice"));
        assert!(comments[1].created_at.is_some());
    }

    #[test]
    fn parse_non_array_is_empty() {
        assert!(parse_comments(&json!({"oops": true})).is_empty());
        assert_eq!(max_comment_id(&[]), 0);
    }

    #[test]
    fn user_message_requires_marker_on_first_line() {
        assert_eq!(
            extract_user_message("**USER**\nuse postgres\nplease").as_deref(),
            Some("use postgres\nplease")
        );
        assert_eq!(
            extract_user_message("prefix **USER** suffix\r\nanswer").as_deref(),
            Some("answer")
        );
        assert!(extract_user_message("some comment\n**USER**\nlate marker").is_none());
        assert!(extract_user_message("   ").is_none());
    }

    #[test]
    fn reply_search_honors_the_watermark() {
        let comments = vec![
            Comment {
                id: 5,
                text: "**USER**\nold reply".into(),
                author: None,
                issue_id: None,
                created_at: None,
            },
            Comment {
                id: 8,
                text: "**SYSTEM** noise".into(),
                author: None,
                issue_id: None,
                created_at: None,
            },
            Comment {
                id: 9,
                text: "**USER**\nfresh reply".into(),
                author: None,
                issue_id: None,
                created_at: None,
            },
        ];
        assert_eq!(max_comment_id(&comments), 9);
        let (id, msg) = find_user_reply_since(&comments, 5).unwrap();
        assert_eq!(id, 9);
        assert_eq!(msg, "fresh reply");
        assert!(find_user_reply_since(&comments, 9).is_none());
    }
}
