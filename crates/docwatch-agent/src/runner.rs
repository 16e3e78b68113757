//! Entry point for streamed agent runs.

use docwatch_core::AgentRuntime;
use futures_util::{stream, StreamExt};

use crate::translator::{translate_progress_stream, AgentEventStream};

/// Invokes the agent and returns its translated event stream.
///
/// An invocation failure becomes the single terminal item of the stream, so
/// callers handle every failure in one place.
pub async fn run_agent_streaming(runtime: &dyn AgentRuntime, instruction: &str) -> AgentEventStream {
    match runtime.invoke(instruction).await {
        Ok(progress) => translate_progress_stream(progress),
        Err(error) => {
            tracing::warn!(error = %error, "agent invocation failed");
            stream::once(async move { Err(error) }).boxed()
        }
    }
}
