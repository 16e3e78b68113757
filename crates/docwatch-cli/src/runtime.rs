//! Service wiring, boot monitors and the shutdown sequence.

use std::sync::Arc;

use anyhow::{Context, Result};
use docwatch_agent::AgentReplyDispatcher;
use docwatch_core::{AgentRuntime, SessionLifecycle};
use docwatch_gateway::{run_gateway_server, GatewayState};
use docwatch_monitor::{IntervalScheduler, MonitorRegistry};
use docwatch_remote::{
    FileCredentialSession, HttpAgentRuntime, HttpAgentRuntimeConfig, HttpCommentFetcher,
    HttpCommentFetcherConfig,
};

use crate::config::{DocwatchConfig, TokenSource};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ShutdownReport {
    pub(crate) stopped_monitors: usize,
    pub(crate) session_cleaned: bool,
    pub(crate) runtime_closed: bool,
}

/// Stops every monitor, releases the credential session and closes the agent
/// client. Each step runs even when an earlier one failed.
///
/// The gateway already stops monitors when the signal fires; the registry
/// step here only catches monitors that were never served.
pub(crate) async fn run_shutdown_sequence(
    registry: &MonitorRegistry,
    session: &dyn SessionLifecycle,
    runtime: &dyn AgentRuntime,
) -> ShutdownReport {
    let stopped_monitors = registry.stop_all();

    let session_cleaned = match session.cleanup().await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "credential session cleanup failed");
            false
        }
    };

    let runtime_closed = match runtime.close().await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(error = %error, "agent runtime close failed");
            false
        }
    };

    tracing::info!(
        stopped_monitors,
        session_cleaned,
        runtime_closed,
        "docwatch shutdown complete"
    );
    ShutdownReport {
        stopped_monitors,
        session_cleaned,
        runtime_closed,
    }
}

pub(crate) async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                tracing::info!("shutdown signal received");
                return;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to install SIGTERM handler; waiting for ctrl-c only");
            }
        }
    }
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

pub(crate) async fn run_docwatch(config: DocwatchConfig) -> Result<()> {
    let session = Arc::new(FileCredentialSession::new(config.credential_cache.clone()));
    if config.token_source == TokenSource::Flag {
        if let Err(error) = session.persist_token(&config.access_token) {
            tracing::warn!(error = %format!("{error:#}"), "failed to cache access token");
        }
    }

    let fetcher = Arc::new(HttpCommentFetcher::new(HttpCommentFetcherConfig {
        api_base: config.doc_api_base.clone(),
        access_token: config.access_token.clone(),
        request_timeout_ms: config.request_timeout_ms,
        retry_max_attempts: config.retry_max_attempts,
        retry_base_delay_ms: config.retry_base_delay_ms,
    })?);
    let runtime: Arc<dyn AgentRuntime> =
        Arc::new(HttpAgentRuntime::new(HttpAgentRuntimeConfig {
            endpoint: config.agent_endpoint.clone(),
            max_iterations: config.agent_max_iterations,
            request_timeout_ms: config.request_timeout_ms,
        })?);
    let dispatcher = Arc::new(AgentReplyDispatcher::new(Arc::clone(&runtime)));
    let registry = MonitorRegistry::new(fetcher, dispatcher, Arc::new(IntervalScheduler));

    for document_id in &config.monitors {
        registry
            .start(document_id.clone(), config.default_interval)
            .with_context(|| format!("failed to start boot monitor for '{document_id}'"))?;
    }

    let state = Arc::new(GatewayState::new(
        registry.clone(),
        Arc::clone(&runtime),
        config.default_interval,
    ));
    let serve_result = run_gateway_server(&config.bind, state, wait_for_shutdown_signal()).await;

    run_shutdown_sequence(&registry, session.as_ref(), runtime.as_ref()).await;
    serve_result
}
