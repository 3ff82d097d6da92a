//! Stream-json protocol spoken by the headless agent.
//!
//! Every stdout line is one JSON object with a `type` discriminant
//! (`system`, `assistant`, `user`, `result`) and, for `system` and `result`,
//! a `subtype`. [`parse_line`] reads the discriminant first, checks the
//! fields required for that kind, then decodes into the typed message.
//! Unknown kinds are rejected per line; the caller decides to log and skip.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, WiggumError};

/// One decoded protocol line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
}

/// Coarse message classification, `type` plus `subtype`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SystemInit,
    CompactBoundary,
    Assistant,
    User,
    ResultSuccess,
    ResultError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemSubtype {
    Init,
    CompactBoundary,
}

/// `system/init` and `system/compact_boundary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    pub subtype: SystemSubtype,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(rename = "permissionMode", default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpServer>,
    #[serde(rename = "apiKeySource", default, skip_serializing_if = "Option::is_none")]
    pub api_key_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_metadata: Option<CompactMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactMetadata {
    pub trigger: String,
    pub pre_tokens: u64,
}

/// A complete assistant turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub message: AssistantBody,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

/// Tool results fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub message: UserBody,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

/// Tool result payload: plain string or an array of typed blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl ToolResultContent {
    /// Flatten to text; non-text blocks are skipped
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    ErrorDuringExecution,
    ErrorMaxBudgetUsd,
}

impl ResultSubtype {
    pub fn is_error(&self) -> bool {
        !matches!(self, ResultSubtype::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSubtype::Success => "success",
            ResultSubtype::ErrorMaxTurns => "error_max_turns",
            ResultSubtype::ErrorDuringExecution => "error_during_execution",
            ResultSubtype::ErrorMaxBudgetUsd => "error_max_budget_usd",
        }
    }
}

/// Final line of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub subtype: ResultSubtype,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    pub num_turns: u32,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: Usage,
    #[serde(rename = "modelUsage", default)]
    pub model_usage: BTreeMap<String, ModelUsage>,
    /// Free-text result, success only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error descriptions, error subtypes only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Per-model usage breakdown in the result message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub web_search_requests: u64,
    #[serde(rename = "costUSD", default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub context_window: u64,
}

impl StreamMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            StreamMessage::System(m) => match m.subtype {
                SystemSubtype::Init => MessageKind::SystemInit,
                SystemSubtype::CompactBoundary => MessageKind::CompactBoundary,
            },
            StreamMessage::Assistant(_) => MessageKind::Assistant,
            StreamMessage::User(_) => MessageKind::User,
            StreamMessage::Result(r) if r.subtype.is_error() => MessageKind::ResultError,
            StreamMessage::Result(_) => MessageKind::ResultSuccess,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            StreamMessage::System(m) => &m.session_id,
            StreamMessage::Assistant(m) => &m.session_id,
            StreamMessage::User(m) => &m.session_id,
            StreamMessage::Result(m) => &m.session_id,
        }
    }

    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            StreamMessage::Result(r) => Some(r),
            _ => None,
        }
    }

    /// Concatenated assistant text blocks (reasoning excluded)
    pub fn assistant_text(&self) -> Option<String> {
        let StreamMessage::Assistant(m) = self else {
            return None;
        };
        let parts: Vec<&str> = m
            .message
            .content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n")) }
    }

    /// Tool-use blocks of an assistant turn as `(name, input)`
    pub fn tool_uses(&self) -> Vec<(&str, &Value)> {
        match self {
            StreamMessage::Assistant(m) => m
                .message
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { name, input, .. } => Some((name.as_str(), input)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Text of all tool results in a user message
    pub fn tool_results(&self) -> Vec<String> {
        match self {
            StreamMessage::User(m) => m
                .message
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { content, .. } => Some(content.as_text()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Decode one stdout line.
pub fn parse_line(line: &str) -> Result<StreamMessage> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| WiggumError::Protocol(format!("invalid JSON: {}", e)))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| WiggumError::Protocol("missing `type` discriminant".to_string()))?;

    match kind {
        "system" => {
            let subtype = subtype_of(&value)?;
            match subtype {
                "init" => require(&value, &["session_id", "model", "tools", "permissionMode"])?,
                "compact_boundary" => require(&value, &["session_id"])?,
                other => return Err(unknown("system", other)),
            }
            decode(value, StreamMessage::System)
        }
        "assistant" => {
            require(&value, &["session_id", "message"])?;
            require(&value["message"], &["content", "stop_reason", "usage"])?;
            decode(value, StreamMessage::Assistant)
        }
        "user" => {
            require(&value, &["session_id", "message"])?;
            require(&value["message"], &["content"])?;
            decode(value, StreamMessage::User)
        }
        "result" => {
            let subtype = subtype_of(&value)?;
            if !matches!(
                subtype,
                "success" | "error_max_turns" | "error_during_execution" | "error_max_budget_usd"
            ) {
                return Err(unknown("result", subtype));
            }
            require(&value, &["session_id", "total_cost_usd", "duration_ms", "num_turns"])?;
            decode(value, StreamMessage::Result)
        }
        other => Err(WiggumError::Protocol(format!("unknown message type: {}", other))),
    }
}

fn subtype_of(value: &Value) -> Result<&str> {
    value
        .get("subtype")
        .and_then(Value::as_str)
        .ok_or_else(|| WiggumError::Protocol("missing `subtype`".to_string()))
}

fn require(value: &Value, fields: &[&str]) -> Result<()> {
    let missing: Vec<&str> = fields.iter().copied().filter(|f| value.get(f).is_none()).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WiggumError::Protocol(format!("missing required fields: {}", missing.join(", "))))
    }
}

fn unknown(kind: &str, subtype: &str) -> WiggumError {
    WiggumError::Protocol(format!("unknown {} subtype: {}", kind, subtype))
}

fn decode<T, F>(value: Value, wrap: F) -> Result<StreamMessage>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(T) -> StreamMessage,
{
    serde_json::from_value(value)
        .map(wrap)
        .map_err(|e| WiggumError::Protocol(format!("malformed message: {}", e)))
}
