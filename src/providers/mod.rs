pub mod openai;
pub mod openrouter;

use std::fmt;

use reqwest::header::HeaderMap;
use serde_json::Value;

use openai::{ChatRequest, DeepSeek, Generic, Groq, OpenAi};
use openrouter::OpenRouter;

/// Wire-protocol variants. Every variant speaks the OpenAI chat-completion
/// envelope; they differ only in extra headers and error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiCompatible,
    OpenAi,
    DeepSeek,
    Groq,
    OpenRouter,
}

/// Endpoint substrings that pin a provider kind regardless of the stored
/// `kind` field. Matched case-insensitively against the whole URL.
const URL_PATTERNS: &[(&str, ProviderKind)] = &[
    ("openrouter.ai", ProviderKind::OpenRouter),
    ("deepseek.com", ProviderKind::DeepSeek),
    ("groq.com", ProviderKind::Groq),
    ("openai.com", ProviderKind::OpenAi),
];

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAiCompatible,
        ProviderKind::OpenAi,
        ProviderKind::DeepSeek,
        ProviderKind::Groq,
        ProviderKind::OpenRouter,
    ];

    /// Parse a configured kind name. Returns `None` for unrecognized names.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai-compatible" | "generic" => Some(Self::OpenAiCompatible),
            "openai" => Some(Self::OpenAi),
            "deepseek" => Some(Self::DeepSeek),
            "groq" => Some(Self::Groq),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn from_url(endpoint_url: &str) -> Option<Self> {
        let url = endpoint_url.to_ascii_lowercase();
        URL_PATTERNS
            .iter()
            .find(|(pattern, _)| url.contains(pattern))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai-compatible",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn handler(self) -> &'static dyn WireProtocol {
        match self {
            Self::OpenAiCompatible => &Generic,
            Self::OpenAi => &OpenAi,
            Self::DeepSeek => &DeepSeek,
            Self::Groq => &Groq,
            Self::OpenRouter => &OpenRouter,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved kind came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindSource {
    /// Endpoint URL matched a known provider domain.
    Url,
    /// The configured `kind` field.
    Configured,
    /// Configured kind was unrecognized; generic parser used.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub kind: ProviderKind,
    pub source: KindSource,
}

/// Pick the wire protocol for an endpoint. URL match beats the configured
/// kind, which beats the generic fallback.
pub fn resolve(endpoint_url: &str, configured_kind: &str) -> Resolution {
    if let Some(kind) = ProviderKind::from_url(endpoint_url) {
        return Resolution {
            kind,
            source: KindSource::Url,
        };
    }
    match ProviderKind::parse(configured_kind) {
        Some(kind) => Resolution {
            kind,
            source: KindSource::Configured,
        },
        None => Resolution {
            kind: ProviderKind::OpenAiCompatible,
            source: KindSource::Fallback,
        },
    }
}

/// What a handler made of a parsed JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Completion(String),
    Error(String),
    Unrecognized,
}

/// Per-kind request construction and response interpretation. The default
/// methods implement the OpenAI-compatible baseline; handlers override only
/// what their upstream does differently.
pub trait WireProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    fn extra_headers(&self) -> HeaderMap {
        HeaderMap::new()
    }

    fn build_request(&self, prompt: &str, upstream_model: &str) -> ChatRequest {
        ChatRequest::user(upstream_model, prompt)
    }

    fn parse_response(&self, body: &Value) -> Parsed {
        openai::parse_envelope(body)
    }
}
