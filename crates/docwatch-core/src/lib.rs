//! Foundational types shared across docwatch crates.
//!
//! Holds the document comment model, the canonical agent event type, the
//! collaborator traits for the remote document service and agent runtime,
//! and small filesystem/time helpers.

pub mod agent_event;
pub mod atomic_io;
pub mod collaborators;
pub mod document;
pub mod time_utils;

pub use agent_event::{AgentEvent, ToolResultPayload};
pub use atomic_io::write_text_atomic;
pub use collaborators::{
    AgentRunError, AgentRuntime, CommentFetcher, DispatchError, FetchError, ProgressStream,
    ReplyDispatcher, SessionLifecycle,
};
pub use document::{Comment, CommentSnapshot, DocumentId, DocumentIdError, NewReply, Reply};
pub use time_utils::{
    current_unix_timestamp, current_unix_timestamp_ms, deserialize_lenient_timestamp,
    parse_lenient_timestamp,
};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use serde_json::json;

    use super::*;

    #[test]
    fn time_utils_round_trip_bounds() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn unit_parse_lenient_timestamp_accepts_seconds_millis_and_rfc3339() {
        let seconds = parse_lenient_timestamp(&json!(1_700_000_000)).expect("seconds");
        let millis = parse_lenient_timestamp(&json!(1_700_000_000_000_i64)).expect("millis");
        let text = parse_lenient_timestamp(&json!("2023-11-14T22:13:20Z")).expect("rfc3339");
        let numeric_text = parse_lenient_timestamp(&json!("1700000000")).expect("numeric text");
        assert_eq!(seconds, millis);
        assert_eq!(seconds, text);
        assert_eq!(seconds, numeric_text);
        assert_eq!(parse_lenient_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_lenient_timestamp(&json!(-5)), None);
        assert_eq!(parse_lenient_timestamp(&json!({"at": 1})), None);
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested/token.json");
        write_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory rejected");
        assert!(error.to_string().contains("is a directory"));
    }
}
