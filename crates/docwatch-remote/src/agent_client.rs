//! Streaming HTTP client for the agent runtime.
//!
//! The runtime answers a run request with newline-delimited JSON, one
//! progress chunk per line.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docwatch_core::{AgentRunError, AgentRuntime, ProgressStream};
use futures_util::{stream, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::transport_helpers::truncate_for_error;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct HttpAgentRuntimeConfig {
    pub endpoint: String,
    pub max_iterations: u32,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct AgentRunRequest<'a> {
    instruction: &'a str,
    max_iterations: u32,
}

pub struct HttpAgentRuntime {
    http: reqwest::Client,
    endpoint: String,
    max_iterations: u32,
    closed: watch::Sender<bool>,
}

impl HttpAgentRuntime {
    pub fn new(config: HttpAgentRuntimeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create agent runtime client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim().to_string(),
            max_iterations: config.max_iterations.max(1),
            closed: watch::channel(false).0,
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(&self, instruction: &str) -> Result<ProgressStream, AgentRunError> {
        if self.is_closed() {
            return Err(AgentRunError::Closed);
        }
        let mut close_signal = self.closed.subscribe();
        let request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(&AgentRunRequest {
                instruction,
                max_iterations: self.max_iterations,
            })
            .send();
        let response = tokio::select! {
            biased;
            () = closed(&mut close_signal) => return Err(AgentRunError::Closed),
            response = request => response.map_err(|error| AgentRunError::Invoke(error.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentRunError::HttpStatus {
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        tracing::debug!(endpoint = %self.endpoint, "agent run accepted");
        Ok(ndjson_progress_stream(response.bytes_stream(), close_signal))
    }

    /// Refuses new runs and ends every open progress stream with
    /// [`AgentRunError::Closed`], dropping its connection.
    async fn close(&self) -> Result<(), AgentRunError> {
        if !self.closed.send_replace(true) {
            tracing::info!(endpoint = %self.endpoint, "agent runtime client closed");
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
/// Incremental splitter for newline-delimited JSON bodies.
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            chunks.extend(decode_line(&line));
        }
        chunks
    }

    /// Decodes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Value> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(raw: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(chunk) => Some(chunk),
        Err(error) => {
            tracing::debug!(error = %error, "agent runtime emitted a non-json line");
            Some(json!({"unparsed": line}))
        }
    }
}

/// Resolves once the owning runtime is closed; never resolves if the runtime
/// was dropped without closing.
async fn closed(signal: &mut watch::Receiver<bool>) {
    let is_closed = signal.wait_for(|closed| *closed).await.is_ok();
    if !is_closed {
        std::future::pending::<()>().await;
    }
}

type ByteStream<B> = Pin<Box<dyn Stream<Item = reqwest::Result<B>> + Send>>;

struct NdjsonState<B> {
    bytes: Option<ByteStream<B>>,
    close_signal: watch::Receiver<bool>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<Value, AgentRunError>>,
}

fn ndjson_progress_stream<S, B>(bytes: S, close_signal: watch::Receiver<bool>) -> ProgressStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = NdjsonState {
        bytes: Some(Box::pin(bytes) as ByteStream<B>),
        close_signal,
        decoder: NdjsonDecoder::default(),
        pending: VecDeque::new(),
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            let bytes = state.bytes.as_mut()?;
            let next = tokio::select! {
                biased;
                () = closed(&mut state.close_signal) => {
                    state.bytes = None;
                    tracing::debug!("agent progress stream aborted by client close");
                    return Some((Err(AgentRunError::Closed), state));
                }
                next = bytes.next() => next,
            };
            match next {
                Some(Ok(bytes)) => state
                    .pending
                    .extend(state.decoder.push(bytes.as_ref()).into_iter().map(Ok)),
                Some(Err(error)) => {
                    state
                        .pending
                        .push_back(Err(AgentRunError::Stream(error.to_string())));
                    state.bytes = None;
                }
                None => {
                    state.pending.extend(state.decoder.finish().map(Ok));
                    state.bytes = None;
                }
            }
        }
    })
    .boxed()
}
