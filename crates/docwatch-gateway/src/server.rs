//! Router wiring and server bootstrap.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::handlers::{
    handle_agent_stream, handle_list_monitors, handle_poll_monitor, handle_start_monitor,
    handle_stop_all_monitors, handle_stop_monitor,
};
use crate::types::GatewayState;

pub const MONITORS_ENDPOINT: &str = "/monitors";
pub const MONITOR_ENDPOINT: &str = "/monitors/{document_id}";
pub const MONITOR_POLL_ENDPOINT: &str = "/monitors/{document_id}/poll";
pub const AGENT_STREAM_ENDPOINT: &str = "/agent/stream";

pub fn build_gateway_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(
            MONITORS_ENDPOINT,
            post(handle_start_monitor)
                .get(handle_list_monitors)
                .delete(handle_stop_all_monitors),
        )
        .route(MONITOR_ENDPOINT, delete(handle_stop_monitor))
        .route(MONITOR_POLL_ENDPOINT, post(handle_poll_monitor))
        .route(AGENT_STREAM_ENDPOINT, post(handle_agent_stream))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Binds `bind` and serves until `shutdown` resolves.
pub async fn run_gateway_server<F>(bind: &str, state: Arc<GatewayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind docwatch gateway on {bind_addr}"))?;
    serve_gateway(listener, state, shutdown).await
}

/// Serves on an already bound listener.
///
/// When `shutdown` resolves, monitors are stopped and open agent streams are
/// interrupted before connections drain. Draining is bounded by
/// `GatewayState::drain_timeout`; connections still open after that are
/// abandoned.
pub async fn serve_gateway<F>(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(addr = %local_addr, "docwatch gateway listening");

    let drain_timeout = state.drain_timeout;
    let drain_started = state.shutdown_requested();
    let signal_state = Arc::clone(&state);
    let graceful = async move {
        shutdown.await;
        let stopped_monitors = signal_state.begin_shutdown();
        tracing::info!(stopped_monitors, "docwatch gateway draining connections");
    };
    let server = axum::serve(listener, build_gateway_router(state))
        .with_graceful_shutdown(graceful)
        .into_future();

    tokio::select! {
        result = server => result.context("docwatch gateway exited unexpectedly"),
        () = async move {
            drain_started.await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!(
                timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
                "docwatch gateway drain timed out; abandoning open connections"
            );
            Ok(())
        }
    }
}
