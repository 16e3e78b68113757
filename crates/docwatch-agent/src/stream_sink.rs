//! Server-sent-events sink for directly requested agent runs.
//!
//! Frames are `data: <json>\n\n`. A completed run ends with
//! `data: [DONE]\n\n`; a failed run ends with a single error frame instead.
//! The transport is closed exactly once on every path.

use std::future::{self, Future};
use std::pin::pin;

use async_trait::async_trait;
use docwatch_core::{AgentEvent, AgentRunError};
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::translator::AgentEventStream;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("stream client disconnected")]
    Disconnected,
    #[error("failed to encode stream frame: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

pub fn error_frame(message: &str) -> String {
    data_frame(&json!({"type": "error", "message": message}).to_string())
}

#[async_trait]
/// Byte sink underneath an SSE response.
pub trait SseTransport: Send {
    async fn send(&mut self, frame: String) -> Result<(), SinkError>;
    async fn close(&mut self);
}

/// Transport backed by a bounded channel whose receiver feeds a response body.
pub struct ChannelTransport {
    sender: Option<mpsc::Sender<String>>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Transport plus the receiving half, with room for `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl SseTransport for ChannelTransport {
    async fn send(&mut self, frame: String) -> Result<(), SinkError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(SinkError::Disconnected);
        };
        sender
            .send(frame)
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    async fn close(&mut self) {
        // Dropping the sender ends the receiving body stream.
        self.sender = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    Completed { events: usize },
    Failed { events: usize, error: String },
    Disconnected { events: usize },
}

pub struct SseStreamSink<T: SseTransport> {
    transport: T,
    events_sent: usize,
    closed: bool,
}

impl<T: SseTransport> SseStreamSink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            events_sent: 0,
            closed: false,
        }
    }

    pub async fn send_event(&mut self, event: &AgentEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event)?;
        self.transport.send(data_frame(&payload)).await?;
        self.events_sent = self.events_sent.saturating_add(1);
        Ok(())
    }

    /// Writes the DONE marker and closes.
    pub async fn finish(mut self) -> StreamOutcome {
        let outcome = match self.transport.send(DONE_FRAME.to_string()).await {
            Ok(()) => StreamOutcome::Completed {
                events: self.events_sent,
            },
            Err(_) => StreamOutcome::Disconnected {
                events: self.events_sent,
            },
        };
        self.close_once().await;
        outcome
    }

    /// Writes one error frame and closes without a DONE marker.
    pub async fn fail(mut self, error: &AgentRunError) -> StreamOutcome {
        let message = error.to_string();
        let outcome = match self.transport.send(error_frame(&message)).await {
            Ok(()) => StreamOutcome::Failed {
                events: self.events_sent,
                error: message,
            },
            Err(_) => StreamOutcome::Disconnected {
                events: self.events_sent,
            },
        };
        self.close_once().await;
        outcome
    }

    /// Forwards every event of `events` and terminates the stream.
    pub async fn drain(self, events: AgentEventStream) -> StreamOutcome {
        self.drain_until(events, future::pending()).await
    }

    /// Like [`drain`](Self::drain), but stops reading once `interrupt`
    /// resolves and reports its error as the terminal frame.
    pub async fn drain_until<F>(mut self, mut events: AgentEventStream, interrupt: F) -> StreamOutcome
    where
        F: Future<Output = AgentRunError> + Send,
    {
        let mut interrupt = pin!(interrupt);
        loop {
            let item = tokio::select! {
                biased;
                error = &mut interrupt => {
                    tracing::info!(error = %error, "agent stream interrupted");
                    return self.fail(&error).await;
                }
                item = events.next() => item,
            };
            let Some(item) = item else {
                return self.finish().await;
            };
            match item {
                Ok(event) => {
                    if let Err(error) = self.send_event(&event).await {
                        tracing::debug!(error = %error, "stream sink stopped early");
                        let outcome = StreamOutcome::Disconnected {
                            events: self.events_sent,
                        };
                        self.close_once().await;
                        return outcome;
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "agent run failed mid-stream");
                    return self.fail(&error).await;
                }
            }
        }
    }

    async fn close_once(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transport.close().await;
    }
}
