//! Document comment model shared by the fetcher, diff engine and dispatch.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_utils::deserialize_lenient_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Opaque key identifying a monitored document.
pub struct DocumentId(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentIdError {
    #[error("document id cannot be empty")]
    Empty,
    #[error("document id '{0}' contains whitespace or '/'")]
    InvalidCharacter(String),
}

impl DocumentId {
    /// Validates and trims a raw identifier from an outer surface.
    pub fn parse(raw: &str) -> Result<Self, DocumentIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DocumentIdError::Empty);
        }
        if trimmed
            .chars()
            .any(|ch| ch.is_whitespace() || ch == '/')
        {
            return Err(DocumentIdError::InvalidCharacter(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One reply inside a comment thread.
pub struct Reply {
    /// Absent ids cannot be deduplicated and are never reported as new.
    #[serde(default)]
    pub reply_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default, deserialize_with = "deserialize_lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A comment thread anchored somewhere in a document.
pub struct Comment {
    pub comment_id: String,
    /// Quoted document text the comment is anchored to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default)]
    pub solved: bool,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Full comment state of one document captured at one poll tick.
pub struct CommentSnapshot {
    pub comments: Vec<Comment>,
}

impl CommentSnapshot {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self { comments }
    }

    pub fn reply_count(&self) -> usize {
        self.comments
            .iter()
            .map(|comment| comment.replies.len())
            .sum()
    }

    /// Iterates every reply id present in the snapshot, skipping anonymous replies.
    pub fn reply_ids(&self) -> impl Iterator<Item = &str> {
        self.comments
            .iter()
            .flat_map(|comment| comment.replies.iter())
            .filter_map(|reply| reply.reply_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A reply detected as new, tagged with its comment context.
pub struct NewReply {
    pub document_id: DocumentId,
    pub comment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    pub reply: Reply,
}

impl NewReply {
    /// Id of the wrapped reply; diff output only ever contains identified replies.
    pub fn reply_id(&self) -> &str {
        self.reply.reply_id.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CommentSnapshot, DocumentId, DocumentIdError, Reply};

    #[test]
    fn unit_document_id_parse_trims_and_rejects_invalid_values() {
        assert_eq!(
            DocumentId::parse("  doxcn123 ").expect("valid id").as_str(),
            "doxcn123"
        );
        assert_eq!(DocumentId::parse("   "), Err(DocumentIdError::Empty));
        assert!(matches!(
            DocumentId::parse("a/b"),
            Err(DocumentIdError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn functional_reply_decode_tolerates_missing_id_and_bad_timestamp() {
        let reply: Reply = serde_json::from_value(json!({
            "author": "ana",
            "created_at": "not-a-date",
            "text": "please fix"
        }))
        .expect("decode reply");
        assert_eq!(reply.reply_id, None);
        assert_eq!(reply.created_at, None);
        assert_eq!(reply.text, "please fix");

        let reply: Reply = serde_json::from_value(json!({
            "reply_id": "r1",
            "created_at": 1_700_000_000,
        }))
        .expect("decode reply with unix seconds");
        assert_eq!(
            reply.created_at.map(|value| value.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn unit_snapshot_reply_ids_skip_anonymous_replies() {
        let snapshot: CommentSnapshot = serde_json::from_value(json!({
            "comments": [
                {"comment_id": "c1", "replies": [{"reply_id": "r1"}, {"text": "anon"}]},
                {"comment_id": "c2", "replies": [{"reply_id": "r2"}]}
            ]
        }))
        .expect("decode snapshot");
        assert_eq!(snapshot.reply_count(), 3);
        assert_eq!(snapshot.reply_ids().collect::<Vec<_>>(), vec!["r1", "r2"]);
    }
}
