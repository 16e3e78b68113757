//! Turns a detected reply into the instruction handed to the agent.

use docwatch_core::NewReply;

/// Reply text with leading `@mention` tokens removed.
pub fn extract_request_text(text: &str) -> &str {
    let mut rest = text.trim_start();
    while rest.starts_with('@') {
        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[token_end..].trim_start();
    }
    rest.trim_end()
}

/// Builds the agent instruction for a detected reply.
///
/// Returns `None` when the reply carries nothing but mentions.
pub fn build_instruction(reply: &NewReply) -> Option<String> {
    let request = extract_request_text(&reply.reply.text);
    if request.is_empty() {
        return None;
    }

    let mut instruction = format!(
        "A collaborator left a request in document {} (comment {}).\n",
        reply.document_id, reply.comment_id
    );
    if let Some(quote) = reply.quote.as_deref().map(str::trim).filter(|quote| !quote.is_empty()) {
        instruction.push_str(&format!("Quoted text: \"{quote}\"\n"));
    }
    if !reply.reply.author.trim().is_empty() {
        instruction.push_str(&format!("Requested by: {}\n", reply.reply.author.trim()));
    }
    instruction.push_str(&format!("Request: {request}"));
    Some(instruction)
}

#[cfg(test)]
mod tests {
    use docwatch_core::{DocumentId, NewReply, Reply};

    use super::{build_instruction, extract_request_text};

    fn new_reply(text: &str, quote: Option<&str>) -> NewReply {
        NewReply {
            document_id: DocumentId::parse("doc-9").expect("doc id"),
            comment_id: "c2".to_string(),
            quote: quote.map(str::to_string),
            reply: Reply {
                reply_id: Some("r4".to_string()),
                author: "ana".to_string(),
                created_at: None,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn unit_leading_mentions_are_stripped() {
        assert_eq!(extract_request_text("@bot  @helper fix the title "), "fix the title");
        assert_eq!(extract_request_text("fix @bot later"), "fix @bot later");
        assert_eq!(extract_request_text("  @bot"), "");
        assert_eq!(extract_request_text(""), "");
    }

    #[test]
    fn functional_instruction_carries_comment_context() {
        let instruction = build_instruction(&new_reply("@bot add a summary", Some("Q3 results")))
            .expect("instruction");
        assert!(instruction.contains("doc-9"));
        assert!(instruction.contains("comment c2"));
        assert!(instruction.contains("Quoted text: \"Q3 results\""));
        assert!(instruction.contains("Requested by: ana"));
        assert!(instruction.ends_with("Request: add a summary"));
    }

    #[test]
    fn regression_mention_only_reply_builds_no_instruction() {
        assert_eq!(build_instruction(&new_reply("@bot", None)), None);
        assert_eq!(build_instruction(&new_reply("   ", Some("quote"))), None);
    }
}
