//! Fan one prompt out to many providers and collect one result per provider.
//!
//! Every provider gets its own tokio task and its own timeout. Results are
//! written back by input position, so the returned order never depends on
//! which upstream answered first. Nothing a provider does (including a
//! panicking task) can fail the dispatch as a whole.

mod classify;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Proxy};
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use crate::error::ChatlistError;
use crate::providers::{self, KindSource, ProviderKind, WireProtocol};
use crate::registry::{CredentialResolver, ProviderConfig};
use crate::results::ModelResult;
use crate::settings::SettingsReader;

pub use classify::DispatchFailure;

/// Injected capabilities the engine reads from. Nothing is pulled from
/// process-global state.
#[derive(Clone)]
pub struct EngineContext {
    pub settings: Arc<dyn SettingsReader>,
    pub credentials: Arc<dyn CredentialResolver>,
}

impl EngineContext {
    pub fn new(
        settings: Arc<dyn SettingsReader>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            settings,
            credentials,
        }
    }
}

/// One fan-out: a prompt plus the providers to ask.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub prompt: String,
    pub providers: Vec<ProviderConfig>,
}

impl DispatchRequest {
    pub fn new(prompt: &str, providers: Vec<ProviderConfig>) -> Self {
        Self {
            prompt: prompt.to_owned(),
            providers,
        }
    }
}

pub struct Dispatcher {
    ctx: EngineContext,
    client: Client,
}

impl Dispatcher {
    /// Build the engine and its HTTP client. The client never picks up proxy
    /// settings from the environment; only the `proxy` setting is honored.
    pub fn new(ctx: EngineContext) -> Result<Self, ChatlistError> {
        let mut builder = Client::builder().no_proxy();
        if let Some(url) = ctx.settings.proxy() {
            let proxy = Proxy::all(&url)
                .map_err(|e| ChatlistError::HttpClient(format!("proxy '{url}': {e}")))?;
            tracing::info!(proxy = %url, "using configured proxy");
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ChatlistError::HttpClient(e.to_string()))?;
        Ok(Self { ctx, client })
    }

    /// Send `prompt` to every provider concurrently. Always returns exactly
    /// one result per provider, in input order.
    pub async fn dispatch(&self, prompt: &str, providers: &[ProviderConfig]) -> Vec<ModelResult> {
        self.execute(DispatchRequest::new(prompt, providers.to_vec()))
            .await
    }

    pub async fn execute(&self, request: DispatchRequest) -> Vec<ModelResult> {
        let providers: Arc<[ProviderConfig]> = request.providers.into();
        let prompt: Arc<str> = request.prompt.into();
        let timeout = self.ctx.settings.timeout();

        tracing::info!(
            providers = providers.len(),
            timeout = ?timeout,
            "dispatching prompt"
        );

        // Spawn everything first so all requests are in flight before any
        // handle is awaited.
        let handles: Vec<_> = (0..providers.len())
            .map(|index| {
                let config = &providers[index];
                let span = tracing::info_span!(
                    "provider",
                    provider = %config.display_name,
                    model = %config.upstream_model_id,
                );
                let providers = Arc::clone(&providers);
                let prompt = Arc::clone(&prompt);
                let credentials = Arc::clone(&self.ctx.credentials);
                let client = self.client.clone();
                tokio::spawn(
                    async move {
                        let config = &providers[index];
                        query_provider(&client, credentials.as_ref(), config, &prompt, timeout)
                            .await
                    }
                    .instrument(span),
                )
            })
            .collect();

        let mut slots = Vec::with_capacity(handles.len());
        for (config, handle) in providers.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(provider = %config.display_name, "provider task failed: {e}");
                    ModelResult::failure(
                        &config.display_name,
                        &DispatchFailure::Unexpected {
                            provider: config.display_name.clone(),
                            detail: e.to_string(),
                        },
                    )
                }
            };
            slots.push(result);
        }
        slots
    }
}

/// Run the full per-provider procedure. Never fails: every outcome becomes a
/// `ModelResult`.
async fn query_provider(
    client: &Client,
    credentials: &dyn CredentialResolver,
    config: &ProviderConfig,
    prompt: &str,
    timeout: Duration,
) -> ModelResult {
    let name = config.display_name.as_str();

    let Some(secret) = credentials.resolve(&config.credential_ref) else {
        let failure = DispatchFailure::MissingCredential {
            credential_ref: config.credential_ref.clone(),
        };
        tracing::warn!("{failure}");
        return ModelResult::failure(name, &failure);
    };

    let resolution = providers::resolve(&config.endpoint_url, &config.kind);
    match resolution.source {
        KindSource::Fallback => tracing::warn!(
            kind = %config.kind,
            "unrecognized provider kind, using the OpenAI-compatible protocol"
        ),
        KindSource::Url if ProviderKind::parse(&config.kind) != Some(resolution.kind) => {
            tracing::debug!(
                configured = %config.kind,
                resolved = %resolution.kind,
                "endpoint URL overrides configured kind"
            )
        }
        _ => {}
    }
    let protocol = resolution.kind.handler();

    match call(client, protocol, config, &secret, prompt, timeout).await {
        Ok(text) => {
            tracing::info!(chars = text.chars().count(), "response received");
            ModelResult::success(name, text)
        }
        Err(failure) => {
            tracing::warn!("{failure}");
            ModelResult::failure(name, &failure)
        }
    }
}

async fn call(
    client: &Client,
    protocol: &dyn WireProtocol,
    config: &ProviderConfig,
    secret: &SecretString,
    prompt: &str,
    timeout: Duration,
) -> Result<String, DispatchFailure> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", secret.expose_secret()))
        .map_err(|_| DispatchFailure::Unexpected {
            provider: config.display_name.clone(),
            detail: "credential contains characters not allowed in an HTTP header".to_owned(),
        })?;
    auth.set_sensitive(true);

    let body = protocol.build_request(prompt, &config.upstream_model_id);
    tracing::info!(protocol = protocol.name(), "sending request");

    let request = client
        .post(config.endpoint_url.as_str())
        .header(ACCEPT, "application/json")
        .header(AUTHORIZATION, auth)
        .headers(protocol.extra_headers())
        .json(&body);

    // Timeout covers both the response head and the body read.
    let exchange = async {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let text = response.text().await?;
        Ok::<_, reqwest::Error>((status, content_type, text))
    };

    let (status, content_type, text) = match tokio::time::timeout(timeout, exchange).await {
        Err(_) => {
            return Err(DispatchFailure::Timeout {
                provider: config.display_name.clone(),
                model: config.upstream_model_id.clone(),
                timeout,
            });
        }
        Ok(Err(e)) => {
            return Err(classify::classify_transport(
                &e,
                &config.display_name,
                &config.upstream_model_id,
                timeout,
            ));
        }
        Ok(Ok(parts)) => parts,
    };

    tracing::debug!(status, bytes = text.len(), "response body read");
    classify::classify_response(
        protocol,
        &config.display_name,
        status,
        content_type.as_deref(),
        &text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{StaticCredentials, provider};
    use crate::results::ResultStatus;
    use crate::settings::Settings;

    fn dispatcher(settings: Settings) -> Dispatcher {
        Dispatcher::new(EngineContext::new(
            Arc::new(settings),
            Arc::new(StaticCredentials::new()),
        ))
        .expect("client should build")
    }

    #[tokio::test]
    async fn empty_provider_list() {
        let results = dispatcher(Settings::new()).dispatch("hello", &[]).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_keep_positions() {
        let providers = [
            provider(1, "One", "http://127.0.0.1:9/v1/chat/completions", "openai"),
            provider(2, "Two", "http://127.0.0.1:9/v1/chat/completions", "groq"),
        ];
        let results = dispatcher(Settings::new()).dispatch("hello", &providers).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].provider_display_name, "One");
        assert_eq!(results[1].provider_display_name, "Two");
        assert!(results.iter().all(|r| r.status == ResultStatus::MissingCredential));
    }

    #[test]
    fn invalid_proxy_rejected() {
        let result = Dispatcher::new(EngineContext::new(
            Arc::new(Settings::new().with("proxy", "http://[::1")),
            Arc::new(StaticCredentials::new()),
        ));
        assert!(matches!(result, Err(ChatlistError::HttpClient(_))));
    }
}
