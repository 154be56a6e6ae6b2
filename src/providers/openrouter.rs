use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::openai::parse_envelope;
use super::{Parsed, WireProtocol};

/// App attribution pair OpenRouter expects on every request.
pub const REFERER: &str = "https://github.com/chatlist";
pub const TITLE: &str = "ChatList";

pub struct OpenRouter;

impl WireProtocol for OpenRouter {
    fn name(&self) -> &'static str {
        "OpenRouter"
    }

    fn extra_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("http-referer"),
            HeaderValue::from_static(REFERER),
        );
        headers.insert(
            HeaderName::from_static("x-title"),
            HeaderValue::from_static(TITLE),
        );
        headers
    }

    /// OpenRouter relays upstream failures with the routed provider's name in
    /// `error.metadata.provider_name`; keep it in the message.
    fn parse_response(&self, body: &Value) -> Parsed {
        match parse_envelope(body) {
            Parsed::Error(message) => {
                let routed = body
                    .pointer("/error/metadata/provider_name")
                    .and_then(Value::as_str);
                match routed {
                    Some(name) => Parsed::Error(format!("{message} (via {name})")),
                    None => Parsed::Error(message),
                }
            }
            other => other,
        }
    }
}
