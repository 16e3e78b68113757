//! Route handlers for monitor management and streamed agent runs.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docwatch_agent::{run_agent_streaming, ChannelTransport, SseStreamSink, StreamOutcome};
use docwatch_core::{AgentRunError, DocumentId};
use docwatch_monitor::{MonitorError, StopOutcome};
use futures_util::{stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;

use crate::types::{AgentStreamRequest, GatewayApiError, GatewayState, StartMonitorRequest};

const STREAM_CHANNEL_CAPACITY: usize = 64;

fn shutdown_error() -> AgentRunError {
    AgentRunError::Interrupted("docwatch is shutting down".to_string())
}

fn parse_document_id(raw: &str) -> Result<DocumentId, GatewayApiError> {
    DocumentId::parse(raw)
        .map_err(|error| GatewayApiError::bad_request("invalid_document_id", error.to_string()))
}

fn monitor_error(error: MonitorError) -> GatewayApiError {
    match error {
        MonitorError::InvalidInterval => {
            GatewayApiError::bad_request("invalid_interval", error.to_string())
        }
        MonitorError::NotFound(_) => GatewayApiError::not_found("not_found", error.to_string()),
        MonitorError::RuntimeUnavailable => GatewayApiError::internal(error.to_string()),
    }
}

pub(crate) async fn handle_start_monitor(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<StartMonitorRequest>,
) -> Result<Response, GatewayApiError> {
    let document_id = parse_document_id(&request.document_id)?;
    let interval = request
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(state.default_interval);
    let started = state
        .registry
        .start(document_id, interval)
        .map_err(monitor_error)?;
    Ok(Json(started).into_response())
}

pub(crate) async fn handle_list_monitors(State(state): State<Arc<GatewayState>>) -> Response {
    let documents = state
        .registry
        .list()
        .into_iter()
        .map(|document_id| {
            let interval_ms = state
                .registry
                .interval(&document_id)
                .map(|interval| u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
            json!({"document_id": document_id, "interval_ms": interval_ms})
        })
        .collect::<Vec<_>>();
    Json(json!({ "documents": documents })).into_response()
}

pub(crate) async fn handle_stop_monitor(
    State(state): State<Arc<GatewayState>>,
    Path(document_id): Path<String>,
) -> Result<Response, GatewayApiError> {
    let document_id = parse_document_id(&document_id)?;
    match state.registry.stop(&document_id) {
        StopOutcome::Stopped => Ok(Json(json!({"stopped": true})).into_response()),
        StopOutcome::NotFound => Err(GatewayApiError::not_found(
            "not_found",
            format!("document '{document_id}' is not monitored"),
        )),
    }
}

pub(crate) async fn handle_stop_all_monitors(State(state): State<Arc<GatewayState>>) -> Response {
    let stopped = state.registry.stop_all();
    Json(json!({ "stopped": stopped })).into_response()
}

pub(crate) async fn handle_poll_monitor(
    State(state): State<Arc<GatewayState>>,
    Path(document_id): Path<String>,
) -> Result<Response, GatewayApiError> {
    let document_id = parse_document_id(&document_id)?;
    let outcome = state
        .registry
        .poll_now(&document_id)
        .await
        .map_err(monitor_error)?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn handle_agent_stream(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<AgentStreamRequest>,
) -> Result<Response, GatewayApiError> {
    if state.is_shutting_down() {
        return Err(GatewayApiError::unavailable(
            "shutting_down",
            "docwatch is shutting down",
        ));
    }
    let instruction = request.instruction.trim().to_string();
    if instruction.is_empty() {
        return Err(GatewayApiError::bad_request(
            "missing_instruction",
            "instruction must not be empty",
        ));
    }

    let (transport, frames) = ChannelTransport::channel(STREAM_CHANNEL_CAPACITY);
    let runtime = Arc::clone(&state.runtime);
    let invoke_interrupted = state.shutdown_requested();
    let drain_interrupted = state.shutdown_requested();
    tokio::spawn(async move {
        let events = tokio::select! {
            events = run_agent_streaming(runtime.as_ref(), &instruction) => events,
            () = invoke_interrupted => stream::once(async { Err(shutdown_error()) }).boxed(),
        };
        let interrupt = async move {
            drain_interrupted.await;
            shutdown_error()
        };
        match SseStreamSink::new(transport).drain_until(events, interrupt).await {
            StreamOutcome::Completed { events } => {
                tracing::info!(events, "agent stream completed");
            }
            StreamOutcome::Failed { events, error } => {
                tracing::warn!(events, error = %error, "agent stream failed");
            }
            StreamOutcome::Disconnected { events } => {
                tracing::info!(events, "agent stream client disconnected");
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<String, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
