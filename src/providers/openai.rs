use serde::Serialize;
use serde_json::Value;

use super::{Parsed, WireProtocol};

pub const TEMPERATURE: f64 = 0.7;

/// OpenAI-style chat-completion request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    /// Single user turn at the default temperature.
    pub fn user(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_owned(),
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
            temperature: TEMPERATURE,
        }
    }
}

/// Interpret `{choices:[{message:{content}}]}` or `{error:{message}}`.
///
/// A completion wins over an error field when both are present. Empty or
/// null content counts as unrecognized.
pub fn parse_envelope(body: &Value) -> Parsed {
    let content = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str);
    if let Some(text) = content.filter(|t| !t.is_empty()) {
        return Parsed::Completion(text.to_owned());
    }
    match error_message(body) {
        Some(message) => Parsed::Error(message),
        None => Parsed::Unrecognized,
    }
}

/// Extract a human message from an `error` field, which upstreams send as
/// either an object with `message` or a bare string.
pub fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    match error {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => match obj.get("message").and_then(Value::as_str) {
            Some(message) => Some(message.to_owned()),
            None => Some(error.to_string()),
        },
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Unrecognized-kind fallback and explicit `openai-compatible` endpoints.
pub struct Generic;

impl WireProtocol for Generic {
    fn name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

pub struct OpenAi;

impl WireProtocol for OpenAi {
    fn name(&self) -> &'static str {
        "OpenAI"
    }
}

pub struct DeepSeek;

impl WireProtocol for DeepSeek {
    fn name(&self) -> &'static str {
        "DeepSeek"
    }
}

pub struct Groq;

impl WireProtocol for Groq {
    fn name(&self) -> &'static str {
        "Groq"
    }
}
