use std::error::Error as _;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::providers::{Parsed, WireProtocol};
use crate::results::ResultStatus;

const EXCERPT_CHARS: usize = 200;

/// Why one provider produced no completion. `Display` is the user-facing
/// text that follows the error marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchFailure {
    #[error("no credential found for {credential_ref}; set it in the environment or .env")]
    MissingCredential { credential_ref: String },

    #[error("network error reaching {provider} (model: {model}): {detail}")]
    Network {
        provider: String,
        model: String,
        detail: String,
    },

    #[error("request to {provider} (model: {model}) timed out after {timeout:?}")]
    Timeout {
        provider: String,
        model: String,
        timeout: Duration,
    },

    #[error(
        "{provider} returned an HTML page instead of JSON (HTTP {status}); \
         the endpoint URL may be wrong, the route invalid, or access blocked in this region"
    )]
    HtmlPage { provider: String, status: u16 },

    #[error("{provider} returned a response that is not valid JSON: {detail}")]
    MalformedJson { provider: String, detail: String },

    #[error("{provider} reported an error: {message}")]
    Upstream { provider: String, message: String },

    #[error("{provider}: {}", status_message(.status, .detail))]
    HttpStatus {
        provider: String,
        status: u16,
        detail: Option<String>,
    },

    #[error("unexpected error from {provider}: {detail}")]
    Unexpected { provider: String, detail: String },
}

impl DispatchFailure {
    pub fn status(&self) -> ResultStatus {
        match self {
            Self::MissingCredential { .. } => ResultStatus::MissingCredential,
            Self::Network { .. } => ResultStatus::NetworkFailure,
            Self::Timeout { .. } => ResultStatus::Timeout,
            Self::HtmlPage { .. } | Self::MalformedJson { .. } => ResultStatus::NonJsonResponse,
            Self::Upstream { .. } => ResultStatus::UpstreamError,
            Self::HttpStatus { .. } => ResultStatus::HttpStatusError,
            Self::Unexpected { .. } => ResultStatus::UnexpectedError,
        }
    }
}

/// Human guidance for the status codes users hit most, `HTTP <code>` for the
/// rest, followed by whatever detail the upstream gave.
fn status_message(status: &u16, detail: &Option<String>) -> String {
    let base = match *status {
        400 => "bad request (HTTP 400): the model may be unavailable or the request was rejected"
            .to_owned(),
        401 => "invalid credential (HTTP 401): check that the API key is correct and active"
            .to_owned(),
        403 => "access forbidden (HTTP 403): the key lacks permission or access is blocked \
                in this region"
            .to_owned(),
        429 => "rate limited (HTTP 429): too many requests, try again later".to_owned(),
        other => format!("HTTP {other}"),
    };
    match detail {
        Some(detail) => format!("{base}: {detail}"),
        None => base,
    }
}

fn html_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\A\s*<(!doctype\s+html|html[\s>])").expect("html regex"))
}

/// HTML by content type, or by sniffing the body when the upstream lies about
/// its content type.
pub(crate) fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    let declared = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false);
    declared || html_regex().is_match(body)
}

fn excerpt(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        Some(format!("{head}..."))
    } else {
        Some(head)
    }
}

/// Turn a received HTTP response into completion text or a failure.
pub(crate) fn classify_response(
    protocol: &dyn WireProtocol,
    provider: &str,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> Result<String, DispatchFailure> {
    let html = looks_like_html(content_type, body);

    if (200..300).contains(&status) {
        if html {
            return Err(DispatchFailure::HtmlPage {
                provider: provider.to_owned(),
                status,
            });
        }
        let value: Value =
            serde_json::from_str(body).map_err(|e| DispatchFailure::MalformedJson {
                provider: provider.to_owned(),
                detail: e.to_string(),
            })?;
        return match protocol.parse_response(&value) {
            Parsed::Completion(text) => Ok(text),
            Parsed::Error(message) => Err(DispatchFailure::Upstream {
                provider: provider.to_owned(),
                message,
            }),
            Parsed::Unrecognized => Err(DispatchFailure::Unexpected {
                provider: provider.to_owned(),
                detail: "response contained no completion text".to_owned(),
            }),
        };
    }

    let detail = if html {
        Some("upstream returned an HTML error page".to_owned())
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => match protocol.parse_response(&value) {
                Parsed::Error(message) => Some(message),
                _ => excerpt(body),
            },
            Err(_) => excerpt(body),
        }
    };
    Err(DispatchFailure::HttpStatus {
        provider: provider.to_owned(),
        status,
        detail,
    })
}

/// Map a transport-level `reqwest` failure.
pub(crate) fn classify_transport(
    err: &reqwest::Error,
    provider: &str,
    model: &str,
    timeout: Duration,
) -> DispatchFailure {
    if err.is_timeout() {
        return DispatchFailure::Timeout {
            provider: provider.to_owned(),
            model: model.to_owned(),
            timeout,
        };
    }
    if err.is_connect() || err.is_request() || err.is_body() || err.is_redirect() {
        return DispatchFailure::Network {
            provider: provider.to_owned(),
            model: model.to_owned(),
            detail: error_chain(err),
        };
    }
    DispatchFailure::Unexpected {
        provider: provider.to_owned(),
        detail: error_chain(err),
    }
}

/// `reqwest` puts the useful part (DNS, refused, TLS) in the source chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let part = inner.to_string();
        if !text.contains(&part) {
            text.push_str(": ");
            text.push_str(&part);
        }
        source = inner.source();
    }
    text
}
