use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docwatch_core::AgentRuntime;
use docwatch_monitor::MonitorRegistry;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

/// Upper bound on draining open connections after shutdown was requested.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub(crate) struct GatewayApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl GatewayApiError {
    pub(crate) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for GatewayApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartMonitorRequest {
    pub(crate) document_id: String,
    #[serde(default)]
    pub(crate) interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentStreamRequest {
    #[serde(default)]
    pub(crate) instruction: String,
}

/// Shared state behind every gateway route.
pub struct GatewayState {
    pub registry: MonitorRegistry,
    pub runtime: Arc<dyn AgentRuntime>,
    pub default_interval: Duration,
    pub drain_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl GatewayState {
    pub fn new(
        registry: MonitorRegistry,
        runtime: Arc<dyn AgentRuntime>,
        default_interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            runtime,
            default_interval,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            shutdown,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Stops every monitor and interrupts open agent streams. Returns the
    /// number of monitors stopped; later calls stop nothing.
    pub fn begin_shutdown(&self) -> usize {
        self.shutdown.send_replace(true);
        self.registry.stop_all()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`begin_shutdown`](Self::begin_shutdown) was called.
    pub(crate) fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            let requested = receiver.wait_for(|requested| *requested).await.is_ok();
            if !requested {
                future::pending::<()>().await;
            }
        }
    }
}
