//! Request, response and wire types for the chat API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Object tag carried by every non-streaming completion response.
pub const CHAT_COMPLETION_OBJECT: &str = "chat.completion";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Inbound chat request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Model override; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl ChatRequest {
    /// Build a request with default sampling parameters.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
        }
    }
}

/// Non-streaming completion response.
///
/// `choices` and `usage` are relayed from the provider without interpretation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[schema(value_type = Vec<Object>)]
    pub choices: Vec<serde_json::Value>,
    #[schema(value_type = Object)]
    pub usage: serde_json::Map<String, serde_json::Value>,
}

impl ChatResponse {
    /// Text of the first choice's message, if any.
    pub fn assistant_content(&self) -> Option<&str> {
        first_choice_content(&self.choices)
    }
}

/// Extract `choices[0].message.content` from a list of choice records.
pub(crate) fn first_choice_content(choices: &[serde_json::Value]) -> Option<&str> {
    choices.first()?.get("message")?.get("content")?.as_str()
}

/// Stable two-field error body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body posted to the provider's chat completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPayload<'a> {
    pub messages: &'a [Message],
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}
