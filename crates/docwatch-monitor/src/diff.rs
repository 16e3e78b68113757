//! Reply-level diff between two comment snapshots.

use std::collections::HashSet;

use docwatch_core::{CommentSnapshot, DocumentId, NewReply};

/// Returns the replies of `current` whose ids were absent from `previous`.
///
/// A missing `previous` is the first poll of a job and always yields nothing.
/// Output follows the order replies appear in `current`. Replies without an
/// id are never reported.
pub fn diff_snapshots(
    document_id: &DocumentId,
    previous: Option<&CommentSnapshot>,
    current: &CommentSnapshot,
) -> Vec<NewReply> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let known_ids = previous.reply_ids().collect::<HashSet<_>>();

    let mut detected = Vec::new();
    for comment in &current.comments {
        for reply in &comment.replies {
            let Some(reply_id) = reply.reply_id.as_deref() else {
                continue;
            };
            if known_ids.contains(reply_id) {
                continue;
            }
            detected.push(NewReply {
                document_id: document_id.clone(),
                comment_id: comment.comment_id.clone(),
                quote: comment.quote.clone(),
                reply: reply.clone(),
            });
        }
    }
    detected
}
