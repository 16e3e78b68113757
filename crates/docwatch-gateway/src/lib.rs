//! HTTP surface for docwatch: monitor management routes and a
//! server-sent-events endpoint for direct agent runs.

mod handlers;
mod server;
mod types;


pub use server::{
    build_gateway_router, run_gateway_server, serve_gateway, AGENT_STREAM_ENDPOINT,
    MONITORS_ENDPOINT, MONITOR_ENDPOINT, MONITOR_POLL_ENDPOINT,
};
pub use types::{GatewayState, DEFAULT_DRAIN_TIMEOUT};
