//! Progress-chunk to [`AgentEvent`] translation.
//!
//! Agent runtimes stream graph updates keyed by the node that produced them
//! (`agent`, `tools`) or bare `messages` lists. Each message is decoded
//! tolerantly: anything unrecognized yields no events.

use std::pin::Pin;

use docwatch_core::{AgentEvent, AgentRunError, ProgressStream, ToolResultPayload};
use futures_util::{stream, Stream, StreamExt};
use serde_json::{Map, Value};

/// Typed event stream produced from a [`ProgressStream`].
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentRunError>> + Send>>;

const END_MARKER: &str = "__end__";
const UNKNOWN_TOOL_NAME: &str = "unknown_tool";
const MESSAGE_CONTAINER_KEYS: [&str; 3] = ["agent", "tools", "messages"];

#[derive(Debug, Default)]
/// Stateful translator for a single agent run.
pub struct AgentEventTranslator {
    last_message: Option<String>,
    finished: bool,
}

enum MessageRole {
    Agent,
    Tool,
}

impl AgentEventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a termination marker was seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn translate(&mut self, chunk: &Value) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        if is_end_marker(chunk) {
            self.finish(&mut events);
            return events;
        }
        let Some(object) = chunk.as_object() else {
            return events;
        };

        for key in MESSAGE_CONTAINER_KEYS {
            let Some(container) = object.get(key) else {
                continue;
            };
            let messages: &[Value] = match container {
                Value::Array(messages) => messages.as_slice(),
                Value::Object(update) => match update.get("messages") {
                    Some(Value::Array(messages)) => messages.as_slice(),
                    _ => &[],
                },
                _ => &[],
            };
            for message in messages {
                self.translate_message(message, &mut events);
            }
        }

        if object.contains_key(END_MARKER) {
            self.finish(&mut events);
        }
        events
    }

    fn finish(&mut self, events: &mut Vec<AgentEvent>) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(content) = self.last_message.clone() {
            events.push(AgentEvent::Final { content });
        }
    }

    fn translate_message(&mut self, message: &Value, events: &mut Vec<AgentEvent>) {
        let Some((role, fields)) = unwrap_message(message) else {
            return;
        };
        match role {
            MessageRole::Tool => events.push(translate_tool_message(fields)),
            MessageRole::Agent => {
                let (text, reasoning) = split_content(fields.get("content"));
                let reasoning = reasoning.or_else(|| kwargs_reasoning(fields));
                if let Some(content) = reasoning {
                    events.push(AgentEvent::Reasoning { content });
                }
                if let Some(content) = text {
                    self.last_message = Some(content.clone());
                    events.push(AgentEvent::Message { content });
                }
                events.extend(tool_calls(fields));
                if let Some(usage) = token_usage(fields) {
                    events.push(usage);
                }
            }
        }
    }
}

/// Adapts a progress-chunk stream into an event stream.
///
/// Runtime errors pass through as `Err` items; the caller stops reading there.
pub fn translate_progress_stream(progress: ProgressStream) -> AgentEventStream {
    let mut translator = AgentEventTranslator::new();
    progress
        .flat_map(move |item| {
            let items = match item {
                Ok(chunk) => translator.translate(&chunk).into_iter().map(Ok).collect(),
                Err(error) => vec![Err(error)],
            };
            stream::iter(items)
        })
        .boxed()
}

fn is_end_marker(chunk: &Value) -> bool {
    match chunk {
        Value::String(marker) => marker == END_MARKER,
        Value::Object(object) => {
            object.get("type").and_then(Value::as_str) == Some("end")
                || object.get("event").and_then(Value::as_str) == Some("end")
        }
        _ => false,
    }
}

/// Resolves serialized-constructor wrappers and classifies the message.
///
/// Only agent turns and tool results are kept; human, system and other
/// roles yield `None`.
fn unwrap_message(message: &Value) -> Option<(MessageRole, &Map<String, Value>)> {
    let object = message.as_object()?;
    if let Some(kwargs) = object.get("kwargs").and_then(Value::as_object) {
        let class_name = object
            .get("id")
            .and_then(Value::as_array)
            .and_then(|path| path.last())
            .and_then(Value::as_str)
            .filter(|class_name| !class_name.is_empty())
            .unwrap_or_else(|| role_tag(kwargs));
        let role = message_role(class_name, kwargs.contains_key("tool_call_id"))?;
        return Some((role, kwargs));
    }

    let role = message_role(role_tag(object), object.contains_key("tool_call_id"))?;
    Some((role, object))
}

fn role_tag(fields: &Map<String, Value>) -> &str {
    fields
        .get("type")
        .or_else(|| fields.get("role"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn message_role(tag: &str, has_tool_call_id: bool) -> Option<MessageRole> {
    match tag {
        "" if has_tool_call_id => Some(MessageRole::Tool),
        "" | "ai" | "assistant" => Some(MessageRole::Agent),
        "tool" => Some(MessageRole::Tool),
        class_name if class_name.starts_with("AIMessage") => Some(MessageRole::Agent),
        class_name if class_name.starts_with("ToolMessage") => Some(MessageRole::Tool),
        _ => None,
    }
}

/// Returns `(text, thinking)` from a string or a list of content parts.
fn split_content(content: Option<&Value>) -> (Option<String>, Option<String>) {
    match content {
        Some(Value::String(text)) => (non_empty(text), None),
        Some(Value::Array(parts)) => {
            let mut text = String::new();
            let mut thinking = String::new();
            for part in parts {
                match part {
                    Value::String(fragment) => text.push_str(fragment),
                    Value::Object(part) => {
                        let kind = part.get("type").and_then(Value::as_str).unwrap_or("text");
                        match kind {
                            "thinking" | "reasoning" => {
                                if let Some(fragment) = ["thinking", "reasoning", "text"]
                                    .iter()
                                    .find_map(|key| part.get(*key).and_then(Value::as_str))
                                {
                                    thinking.push_str(fragment);
                                }
                            }
                            "text" => {
                                if let Some(fragment) = part.get("text").and_then(Value::as_str) {
                                    text.push_str(fragment);
                                }
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            (non_empty(&text), non_empty(&thinking))
        }
        _ => (None, None),
    }
}

fn kwargs_reasoning(fields: &Map<String, Value>) -> Option<String> {
    let kwargs = fields.get("additional_kwargs")?.as_object()?;
    ["reasoning_content", "reasoning", "thinking"]
        .iter()
        .find_map(|key| kwargs.get(*key).and_then(Value::as_str).and_then(non_empty))
}

fn tool_calls(fields: &Map<String, Value>) -> Vec<AgentEvent> {
    let Some(calls) = fields.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let call = call.as_object()?;
            let function = call.get("function").and_then(Value::as_object);
            let name = call
                .get("name")
                .or_else(|| function.and_then(|function| function.get("name")))
                .and_then(Value::as_str)
                .and_then(non_empty)?;
            let raw_arguments = call
                .get("args")
                .or_else(|| call.get("arguments"))
                .or_else(|| function.and_then(|function| function.get("arguments")));
            Some(AgentEvent::ToolCall {
                name,
                arguments: parse_arguments(raw_arguments),
            })
        })
        .collect()
}

fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(serialized)) => {
            if serialized.trim().is_empty() {
                return Value::Object(Map::new());
            }
            serde_json::from_str(serialized).unwrap_or_else(|_| Value::String(serialized.clone()))
        }
        Some(other) => other.clone(),
    }
}

fn token_usage(fields: &Map<String, Value>) -> Option<AgentEvent> {
    if let Some(usage) = fields.get("usage_metadata").and_then(Value::as_object) {
        if let Some(event) = usage_event(usage, "input_tokens", "output_tokens", "total_tokens") {
            return Some(event);
        }
    }
    let metadata = fields.get("response_metadata")?.as_object()?;
    if let Some(usage) = metadata.get("tokenUsage").and_then(Value::as_object) {
        if let Some(event) = usage_event(usage, "promptTokens", "completionTokens", "totalTokens") {
            return Some(event);
        }
    }
    let usage = metadata.get("usage").and_then(Value::as_object)?;
    usage_event(usage, "input_tokens", "output_tokens", "total_tokens")
        .or_else(|| usage_event(usage, "prompt_tokens", "completion_tokens", "total_tokens"))
}

fn usage_event(
    usage: &Map<String, Value>,
    input_key: &str,
    output_key: &str,
    total_key: &str,
) -> Option<AgentEvent> {
    let input = usage.get(input_key).and_then(token_count);
    let output = usage.get(output_key).and_then(token_count);
    if input.is_none() && output.is_none() {
        return None;
    }
    let input_tokens = input.unwrap_or(0);
    let output_tokens = output.unwrap_or(0);
    let total_tokens = usage
        .get(total_key)
        .and_then(token_count)
        .unwrap_or_else(|| input_tokens.saturating_add(output_tokens));
    Some(AgentEvent::TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens,
    })
}

fn token_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|count| count.is_finite() && *count >= 0.0)
            .map(|count| count as u64)
    })
}

fn translate_tool_message(fields: &Map<String, Value>) -> AgentEvent {
    let name = tool_name(fields);
    let is_error_status = fields.get("status").and_then(Value::as_str) == Some("error");

    let content = match fields.get("content") {
        Some(Value::Array(parts)) if parts.iter().all(is_text_part) => {
            Value::String(split_content(fields.get("content")).0.unwrap_or_default())
        }
        Some(content) => content.clone(),
        None => Value::Null,
    };

    if is_error_status {
        let message = match &content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return AgentEvent::tool_failure(name, message);
    }

    match content {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) if parsed.is_object() || parsed.is_array() => classify_payload(name, parsed),
            _ => AgentEvent::tool_success(name, ToolResultPayload::Raw(text)),
        },
        Value::Null => AgentEvent::tool_success(name, ToolResultPayload::Raw(String::new())),
        structured => classify_payload(name, structured),
    }
}

fn is_text_part(part: &Value) -> bool {
    match part {
        Value::String(_) => true,
        Value::Object(part) => part.get("type").and_then(Value::as_str) == Some("text"),
        _ => false,
    }
}

/// Tool name from the compound call id (`<tool>:<suffix>`), else `name`.
fn tool_name(fields: &Map<String, Value>) -> String {
    fields
        .get("tool_call_id")
        .and_then(Value::as_str)
        .and_then(|call_id| call_id.split(':').next())
        .and_then(non_empty)
        .or_else(|| fields.get("name").and_then(Value::as_str).and_then(non_empty))
        .unwrap_or_else(|| UNKNOWN_TOOL_NAME.to_string())
}

fn classify_payload(name: String, payload: Value) -> AgentEvent {
    let Value::Object(object) = &payload else {
        return AgentEvent::tool_success(name, ToolResultPayload::Structured(payload));
    };

    let status = match object.get("code") {
        Some(code) => code.as_i64().map(|code| code == 0),
        None => object.get("success").and_then(Value::as_bool),
    };
    match status {
        Some(true) => {
            let data = object.get("data").cloned().unwrap_or_else(|| payload.clone());
            AgentEvent::tool_success(name, ToolResultPayload::Structured(data))
        }
        Some(false) => {
            let message = ["msg", "message", "error"]
                .iter()
                .find_map(|key| match object.get(*key) {
                    Some(Value::String(text)) => non_empty(text),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                })
                .unwrap_or_else(|| match object.get("code") {
                    Some(code) => format!("tool returned code {code}"),
                    None => "tool reported failure".to_string(),
                });
            AgentEvent::tool_failure(name, message)
        }
        None => AgentEvent::tool_success(name, ToolResultPayload::Structured(payload)),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
