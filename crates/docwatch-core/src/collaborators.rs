//! Narrow interfaces to the systems docwatch consumes but does not own.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::document::{CommentSnapshot, DocumentId, NewReply};

/// Single-pass sequence of raw progress chunks produced by an agent run.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<Value, AgentRunError>> + Send>>;

#[derive(Debug, Error)]
/// Failure while fetching the comment state of a document.
pub enum FetchError {
    #[error("comment fetch transport error: {0}")]
    Transport(String),
    #[error("comment fetch unauthorized (status {status})")]
    Unauthorized { status: u16 },
    #[error("comment api returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("comment api error code {code}: {message}")]
    Api { code: i64, message: String },
    #[error("invalid comment response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
/// Failure while invoking or consuming an agent run.
pub enum AgentRunError {
    #[error("agent invocation failed: {0}")]
    Invoke(String),
    #[error("agent runtime returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("agent progress stream failed: {0}")]
    Stream(String),
    #[error("agent runtime client is closed")]
    Closed,
    #[error("agent run interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
/// Failure while handling one detected reply.
pub enum DispatchError {
    #[error(transparent)]
    Agent(#[from] AgentRunError),
    #[error("dispatch sink failed: {0}")]
    Sink(String),
}

#[async_trait]
/// Reads the current comment state of a document from the remote service.
pub trait CommentFetcher: Send + Sync {
    async fn fetch(&self, document_id: &DocumentId) -> Result<CommentSnapshot, FetchError>;
}

#[async_trait]
/// Tool-using agent reachable over some transport.
pub trait AgentRuntime: Send + Sync {
    async fn invoke(&self, instruction: &str) -> Result<ProgressStream, AgentRunError>;

    /// Closes the tool-invocation client connection. Called once at shutdown.
    async fn close(&self) -> Result<(), AgentRunError> {
        Ok(())
    }
}

#[async_trait]
/// Credential/session resource of the remote document service.
pub trait SessionLifecycle: Send + Sync {
    /// Best-effort release, called once at shutdown.
    async fn cleanup(&self) -> anyhow::Result<()>;
}

#[async_trait]
/// Handles one newly detected reply end to end.
pub trait ReplyDispatcher: Send + Sync {
    async fn dispatch(&self, reply: &NewReply) -> Result<(), DispatchError>;
}
