//! Operator-log sink for comment-triggered agent runs.

use std::sync::Arc;

use async_trait::async_trait;
use docwatch_core::{
    AgentEvent, AgentRuntime, DispatchError, NewReply, ReplyDispatcher, ToolResultPayload,
};
use futures_util::StreamExt;
use serde_json::Value;

use crate::instruction::build_instruction;
use crate::translator::translate_progress_stream;

const MAX_CONSOLE_FIELD_CHARS: usize = 240;

/// Renders one event as a single human-readable line.
pub fn render_console_line(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Reasoning { content } => format!("thinking: {}", clip(content)),
        AgentEvent::Message { content } => format!("agent: {}", clip(content)),
        AgentEvent::ToolCall { name, arguments } => {
            format!("tool call {name}({})", clip(&arguments.to_string()))
        }
        AgentEvent::ToolResult {
            name,
            success: true,
            result,
            ..
        } => {
            let rendered = match result {
                Some(ToolResultPayload::Raw(text)) => text.clone(),
                Some(ToolResultPayload::Structured(Value::String(text))) => text.clone(),
                Some(ToolResultPayload::Structured(value)) => value.to_string(),
                None => String::new(),
            };
            format!("tool {name} ok: {}", clip(&rendered))
        }
        AgentEvent::ToolResult {
            name,
            success: false,
            error,
            ..
        } => format!(
            "tool {name} failed: {}",
            clip(error.as_deref().unwrap_or("unknown error"))
        ),
        AgentEvent::TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens,
        } => format!("tokens: input={input_tokens} output={output_tokens} total={total_tokens}"),
        AgentEvent::Final { content } => format!("final: {}", clip(content)),
    }
}

fn clip(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= MAX_CONSOLE_FIELD_CHARS {
        return single_line;
    }
    let mut clipped = single_line
        .chars()
        .take(MAX_CONSOLE_FIELD_CHARS)
        .collect::<String>();
    clipped.push_str("...");
    clipped
}

#[derive(Debug, Clone)]
/// Writes agent progress for one reply to the log.
pub struct ConsoleSink {
    document_id: String,
    reply_id: String,
}

impl ConsoleSink {
    pub fn for_reply(reply: &NewReply) -> Self {
        Self {
            document_id: reply.document_id.to_string(),
            reply_id: reply.reply_id().to_string(),
        }
    }

    pub fn emit(&self, event: &AgentEvent) {
        tracing::info!(
            document_id = %self.document_id,
            reply_id = %self.reply_id,
            kind = event.kind(),
            "{}",
            render_console_line(event)
        );
    }

    pub fn emit_error(&self, message: &str) {
        tracing::error!(
            document_id = %self.document_id,
            reply_id = %self.reply_id,
            "agent run failed: {message}"
        );
    }
}

/// Comment-triggered dispatch: builds the instruction, runs the agent to
/// completion and reports progress on the console.
pub struct AgentReplyDispatcher {
    runtime: Arc<dyn AgentRuntime>,
}

impl AgentReplyDispatcher {
    pub fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ReplyDispatcher for AgentReplyDispatcher {
    async fn dispatch(&self, reply: &NewReply) -> Result<(), DispatchError> {
        let sink = ConsoleSink::for_reply(reply);
        let Some(instruction) = build_instruction(reply) else {
            tracing::info!(
                document_id = %reply.document_id,
                reply_id = %reply.reply_id(),
                "reply carries no request text; skipping agent run"
            );
            return Ok(());
        };

        let progress = match self.runtime.invoke(&instruction).await {
            Ok(progress) => progress,
            Err(error) => {
                sink.emit_error(&error.to_string());
                return Err(error.into());
            }
        };

        let mut events = translate_progress_stream(progress);
        let mut emitted = 0_usize;
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    sink.emit(&event);
                    emitted = emitted.saturating_add(1);
                }
                Err(error) => {
                    sink.emit_error(&error.to_string());
                    return Err(error.into());
                }
            }
        }
        tracing::debug!(
            document_id = %reply.document_id,
            reply_id = %reply.reply_id(),
            events = emitted,
            "agent run completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use docwatch_core::{
        AgentEvent, AgentRunError, AgentRuntime, DispatchError, DocumentId, NewReply,
        ProgressStream, Reply, ReplyDispatcher, ToolResultPayload,
    };
    use futures_util::{stream, StreamExt};
    use serde_json::{json, Value};

    use super::{render_console_line, AgentReplyDispatcher};

    struct ScriptedRuntime {
        instructions: Mutex<Vec<String>>,
        chunks: Vec<Value>,
        fail_invoke: bool,
        fail_mid_stream: bool,
    }

    impl ScriptedRuntime {
        fn new(chunks: Vec<Value>) -> Self {
            Self {
                instructions: Mutex::new(Vec::new()),
                chunks,
                fail_invoke: false,
                fail_mid_stream: false,
            }
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn invoke(&self, instruction: &str) -> Result<ProgressStream, AgentRunError> {
            self.instructions
                .lock()
                .expect("instructions lock")
                .push(instruction.to_string());
            if self.fail_invoke {
                return Err(AgentRunError::Invoke("connection refused".to_string()));
            }
            let mut items = self.chunks.iter().cloned().map(Ok).collect::<Vec<_>>();
            if self.fail_mid_stream {
                items.push(Err(AgentRunError::Stream("reset".to_string())));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn new_reply(text: &str) -> NewReply {
        NewReply {
            document_id: DocumentId::parse("doc-1").expect("doc id"),
            comment_id: "c1".to_string(),
            quote: None,
            reply: Reply {
                reply_id: Some("r4".to_string()),
                author: "ana".to_string(),
                created_at: None,
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn unit_console_lines_are_single_line_and_clipped() {
        assert_eq!(
            render_console_line(&AgentEvent::Message {
                content: "two\nlines".to_string()
            }),
            "agent: two lines"
        );
        assert_eq!(
            render_console_line(&AgentEvent::tool_failure("search", "denied")),
            "tool search failed: denied"
        );
        assert_eq!(
            render_console_line(&AgentEvent::tool_success(
                "read",
                ToolResultPayload::Structured(json!({"n": 1}))
            )),
            "tool read ok: {\"n\":1}"
        );
        let long = render_console_line(&AgentEvent::Final {
            content: "x".repeat(1_000),
        });
        assert!(long.ends_with("..."));
        assert!(long.len() < 300);
    }

    #[tokio::test]
    async fn functional_dispatch_runs_agent_to_completion() {
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            json!({"agent": {"messages": [{"type": "ai", "content": "done"}]}}),
            json!({"type": "end"}),
        ]));
        let dispatcher = AgentReplyDispatcher::new(runtime.clone());
        dispatcher
            .dispatch(&new_reply("@bot tidy the intro"))
            .await
            .expect("dispatch succeeds");

        let instructions = runtime.instructions.lock().expect("instructions lock");
        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].contains("tidy the intro"));
    }

    #[tokio::test]
    async fn functional_invoke_and_stream_failures_surface_as_dispatch_errors() {
        let mut failing = ScriptedRuntime::new(Vec::new());
        failing.fail_invoke = true;
        let error = AgentReplyDispatcher::new(Arc::new(failing))
            .dispatch(&new_reply("do it"))
            .await
            .expect_err("invoke failure");
        assert!(matches!(error, DispatchError::Agent(AgentRunError::Invoke(_))));

        let mut broken = ScriptedRuntime::new(vec![json!({"agent": {"messages": []}})]);
        broken.fail_mid_stream = true;
        let error = AgentReplyDispatcher::new(Arc::new(broken))
            .dispatch(&new_reply("do it"))
            .await
            .expect_err("stream failure");
        assert!(matches!(error, DispatchError::Agent(AgentRunError::Stream(_))));
    }

    #[tokio::test]
    async fn regression_mention_only_reply_does_not_invoke_agent() {
        let runtime = Arc::new(ScriptedRuntime::new(Vec::new()));
        AgentReplyDispatcher::new(runtime.clone())
            .dispatch(&new_reply("@bot"))
            .await
            .expect("skip is not a failure");
        assert!(runtime.instructions.lock().expect("lock").is_empty());
    }
}
