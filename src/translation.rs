// src/translation.rs

//! Conversion between the OpenAI-style chat schema and the upstream native
//! `generateContent` schema. Everything here is pure.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const SYSTEM_PREFIX: &str = "System: ";

/// Shape of an inbound request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFormat {
    /// OpenAI-style chat completion; translated in both directions.
    OpenAi,
    /// Already in the upstream shape; passed through unchanged.
    Native,
}

impl InboundFormat {
    /// A body is OpenAI-style iff it carries a non-empty `messages` array.
    pub fn detect(body: &Value) -> Self {
        let has_messages = body
            .get("messages")
            .and_then(Value::as_array)
            .is_some_and(|messages| !messages.is_empty());
        if has_messages {
            Self::OpenAi
        } else {
            Self::Native
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatMessage {
    fn text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeRequest {
    pub contents: Vec<Turn>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

impl Turn {
    fn new(role: &str, text: String) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![TextPart { text }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
}

/// Converts an OpenAI-style chat request into native turns.
///
/// System messages become user turns prefixed with `System: `. Pending system
/// text is held and joined, one entry per line, in front of the next user
/// turn. System text with no later user turn is emitted as a trailing user
/// turn of its own. Roles other than system, user and assistant are dropped.
pub fn openai_to_native(request: &ChatRequest) -> NativeRequest {
    let mut contents = Vec::with_capacity(request.messages.len());
    let mut pending_system: Vec<String> = Vec::new();

    for message in &request.messages {
        match message.role.as_str() {
            "system" => pending_system.push(format!("{SYSTEM_PREFIX}{}", message.text())),
            "user" => {
                let text = if pending_system.is_empty() {
                    message.text()
                } else {
                    pending_system.push(message.text());
                    std::mem::take(&mut pending_system).join("\n")
                };
                contents.push(Turn::new("user", text));
            }
            "assistant" => contents.push(Turn::new("model", message.text())),
            _ => {}
        }
    }

    if !pending_system.is_empty() {
        contents.push(Turn::new("user", pending_system.join("\n")));
    }

    let generation_config = (request.temperature.is_some() || request.max_tokens.is_some())
        .then(|| GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        });

    NativeRequest {
        contents,
        generation_config,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct NativeResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<ContentPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: u64,
    candidates_token_count: u64,
    total_token_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Converts a native response into an OpenAI-style chat completion.
///
/// The conversion is lossy: only the first candidate and its first text
/// part are surfaced. Other candidates, non-text parts and safety metadata
/// are dropped. `model` comes from the call context, not the response.
pub fn native_to_openai(response: &Value, model: &str) -> ChatCompletion {
    let parsed = NativeResponse::deserialize(response).unwrap_or_default();
    let candidate = parsed.candidates.into_iter().next().unwrap_or_default();

    let content = candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .unwrap_or_default();
    let finish_reason = candidate
        .finish_reason
        .filter(|r| !r.is_empty())
        .map_or_else(|| "stop".to_string(), |r| r.to_lowercase());
    let usage = parsed.usage_metadata.unwrap_or_default();

    ChatCompletion {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason,
        }],
        usage: Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    }
}

/// An inbound body made ready for the upstream call.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub format: InboundFormat,
    pub payload: Value,
}

impl PreparedRequest {
    /// Parses the raw inbound body and translates it when it is OpenAI-style.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::malformed(format!("Request body is not valid JSON: {e}")))?;

        match InboundFormat::detect(&value) {
            InboundFormat::OpenAi => {
                let chat = ChatRequest::deserialize(&value)
                    .map_err(|e| AppError::malformed(format!("Invalid chat request: {e}")))?;
                let payload = serde_json::to_value(openai_to_native(&chat))?;
                Ok(Self {
                    format: InboundFormat::OpenAi,
                    payload,
                })
            }
            InboundFormat::Native => Ok(Self {
                format: InboundFormat::Native,
                payload: value,
            }),
        }
    }

    /// Maps the upstream body back to the caller's format.
    pub fn translate_response(&self, upstream: Value, model: &str) -> Result<Value> {
        match self.format {
            InboundFormat::OpenAi => Ok(serde_json::to_value(native_to_openai(&upstream, model))?),
            InboundFormat::Native => Ok(upstream),
        }
    }
}
