use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
/// Tool output after best-effort shape sniffing.
pub enum ToolResultPayload {
    Raw(String),
    Structured(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// Canonical event emitted while an agent run progresses.
pub enum AgentEvent {
    Reasoning {
        content: String,
    },
    Message {
        content: String,
    },
    ToolCall {
        name: String,
        arguments: Value,
    },
    ToolResult {
        name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ToolResultPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TokenUsage {
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
    },
    Final {
        content: String,
    },
}

impl AgentEvent {
    pub fn tool_success(name: impl Into<String>, payload: ToolResultPayload) -> Self {
        Self::ToolResult {
            name: name.into(),
            success: true,
            result: Some(payload),
            error: None,
        }
    }

    pub fn tool_failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolResult {
            name: name.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Wire tag of the event, matching the serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::Message { .. } => "message",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::TokenUsage { .. } => "token_usage",
            Self::Final { .. } => "final",
        }
    }
}
