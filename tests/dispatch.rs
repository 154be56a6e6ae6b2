use std::sync::Arc;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatlist::providers::ProviderKind;
use chatlist::providers::openrouter::{REFERER, TITLE};
use chatlist::registry::{CredentialResolver, StaticCredentials};
use chatlist::settings::Settings;
use chatlist::{
    Dispatcher, ERROR_MARKER, EngineContext, ModelResult, ProviderConfig, ResultStatus,
};

const CHAT_PATH: &str = "/v1/chat/completions";
const KEY_NAME: &str = "TEST_API_KEY";
const KEY: &str = "sk-test-123";

fn dispatcher_with(settings: Settings) -> Dispatcher {
    Dispatcher::new(EngineContext::new(
        Arc::new(settings),
        Arc::new(StaticCredentials::new().with(KEY_NAME, KEY)),
    ))
    .expect("client should build")
}

fn dispatcher() -> Dispatcher {
    dispatcher_with(Settings::new().with("timeout", "5"))
}

fn provider(id: u64, name: &str, url: String, kind: &str) -> ProviderConfig {
    ProviderConfig {
        id,
        display_name: name.to_owned(),
        endpoint_url: url,
        upstream_model_id: format!("model-{id}"),
        credential_ref: KEY_NAME.to_owned(),
        kind: kind.to_owned(),
        active: true,
    }
}

/// Blows up on one credential name; everything else comes from a working
/// table.
struct PanickingCredentials {
    inner: StaticCredentials,
}

impl CredentialResolver for PanickingCredentials {
    fn resolve(&self, credential_ref: &str) -> Option<SecretString> {
        if credential_ref == "EXPLODING_KEY" {
            panic!("boom");
        }
        self.inner.resolve(credential_ref)
    }
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    }))
}

/// Each provider gets its own path on one mock server.
async fn mount_at(server: &MockServer, route: &str, response: ResponseTemplate) -> String {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
    format!("{}{route}", server.uri())
}

#[tokio::test]
async fn empty_provider_list_yields_empty_results() {
    assert!(dispatcher().dispatch("hello", &[]).await.is_empty());
}

#[tokio::test]
async fn results_align_with_input_order_not_completion_order() {
    let server = MockServer::start().await;
    let slow = mount_at(
        &server,
        "/slow",
        completion("slow answer").set_delay(Duration::from_millis(600)),
    )
    .await;
    let medium = mount_at(
        &server,
        "/medium",
        completion("medium answer").set_delay(Duration::from_millis(300)),
    )
    .await;
    let fast = mount_at(&server, "/fast", completion("fast answer")).await;

    let providers = [
        provider(1, "Slow", slow, "openai"),
        provider(2, "Medium", medium, "groq"),
        provider(3, "Fast", fast, "deepseek"),
    ];
    let results = dispatcher().dispatch("hi", &providers).await;

    let names: Vec<_> = results.iter().map(|r| r.provider_display_name.as_str()).collect();
    assert_eq!(names, ["Slow", "Medium", "Fast"]);
    let texts: Vec<_> = results.iter().map(|r| r.response_text.as_str()).collect();
    assert_eq!(texts, ["slow answer", "medium answer", "fast answer"]);
}

#[tokio::test]
async fn missing_credential_skips_http_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("should not be reached"))
        .expect(0)
        .mount(&server)
        .await;

    let mut p = provider(1, "Keyless", format!("{}{CHAT_PATH}", server.uri()), "openai");
    p.credential_ref = "NOT_CONFIGURED_KEY".to_owned();

    let results = dispatcher().dispatch("hi", &[p]).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ResultStatus::MissingCredential);
    assert!(results[0].response_text.starts_with(ERROR_MARKER));
    assert!(results[0].response_text.contains("NOT_CONFIGURED_KEY"));
}

#[tokio::test]
async fn request_carries_envelope_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CHAT_PATH))
        .and(header("Authorization", format!("Bearer {KEY}").as_str()))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "model": "model-1",
            "messages": [{"role": "user", "content": "Capital of France?"}],
            "temperature": 0.7
        })))
        .respond_with(completion("Paris"))
        .expect(1)
        .mount(&server)
        .await;

    let p = provider(1, "GPT", format!("{}{CHAT_PATH}", server.uri()), "openai");
    let results = dispatcher().dispatch("Capital of France?", &[p]).await;
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].response_text, "Paris");
}

#[tokio::test]
async fn url_pattern_forces_openrouter_headers() {
    let server = MockServer::start().await;
    let route = "/openrouter.ai/api/v1/chat/completions";
    Mock::given(method("POST"))
        .and(path(route))
        .and(header("HTTP-Referer", REFERER))
        .and(header("X-Title", TITLE))
        .respond_with(completion("routed"))
        .expect(1)
        .mount(&server)
        .await;

    // Stored kind is stale; the URL decides.
    let p = provider(1, "Router", format!("{}{route}", server.uri()), "generic");
    let results = dispatcher().dispatch("hi", &[p]).await;
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].response_text, "routed");
}

#[tokio::test]
async fn generic_kind_sends_no_attribution_headers() {
    let server = MockServer::start().await;
    let url = mount_at(&server, CHAT_PATH, completion("plain")).await;

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Local", url, "generic")])
        .await;
    assert_eq!(results[0].status, ResultStatus::Success);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("x-title").is_none());
    assert!(requests[0].headers.get("http-referer").is_none());
}

#[tokio::test]
async fn unknown_kind_falls_back_to_openai_parsing() {
    let server = MockServer::start().await;
    let url = mount_at(&server, CHAT_PATH, completion("fallback works")).await;

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Mystery", url, "some-new-vendor")])
        .await;
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].response_text, "fallback works");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wall_clock_bounded_by_slowest_provider() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(1000);
    let a = mount_at(&server, "/a", completion("A done").set_delay(delay)).await;
    let b = mount_at(&server, "/b", completion("B done").set_delay(delay)).await;

    let started = Instant::now();
    let results = dispatcher()
        .dispatch(
            "hi",
            &[provider(1, "A", a, "openai"), provider(2, "B", b, "openai")],
        )
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed >= delay, "finished too early: {elapsed:?}");
    assert!(elapsed < delay * 2 - Duration::from_millis(200), "ran serially: {elapsed:?}");
    assert_eq!(results[0].provider_display_name, "A");
    assert_eq!(results[0].response_text, "A done");
    assert_eq!(results[1].provider_display_name, "B");
    assert_eq!(results[1].response_text, "B done");
}

#[tokio::test]
async fn timeout_is_isolated_to_one_provider() {
    let server = MockServer::start().await;
    let stuck = mount_at(
        &server,
        "/stuck",
        completion("too late").set_delay(Duration::from_secs(3)),
    )
    .await;
    let quick = mount_at(&server, "/quick", completion("on time")).await;

    let results = dispatcher_with(Settings::new().with("timeout", "0.3"))
        .dispatch(
            "hi",
            &[provider(1, "Stuck", stuck, "openai"), provider(2, "Quick", quick, "openai")],
        )
        .await;

    assert_eq!(results[0].status, ResultStatus::Timeout);
    assert!(results[0].response_text.contains("timed out"));
    assert!(results[0].response_text.contains("model-1"));
    assert_eq!(results[1].status, ResultStatus::Success);
}

#[tokio::test]
async fn connection_refused_is_network_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}{CHAT_PATH}");

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Down", url, "openai")])
        .await;
    assert_eq!(results[0].status, ResultStatus::NetworkFailure);
    assert!(results[0].response_text.starts_with("Error: network error reaching Down"));
}

#[tokio::test]
async fn html_interstitial_gets_specific_diagnostic() {
    let server = MockServer::start().await;
    let page = "<!DOCTYPE html><html><head><title>Just a moment...</title></head></html>";
    let url = mount_at(
        &server,
        CHAT_PATH,
        ResponseTemplate::new(200).set_body_raw(page, "text/html"),
    )
    .await;

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Blocked", url, "openai")])
        .await;
    assert_eq!(results[0].status, ResultStatus::NonJsonResponse);
    assert!(results[0].response_text.contains("HTML page instead of JSON"));
    assert!(!results[0].response_text.contains("not valid JSON"));
}

#[tokio::test]
async fn malformed_json_gets_parse_diagnostic() {
    let server = MockServer::start().await;
    let url = mount_at(
        &server,
        CHAT_PATH,
        ResponseTemplate::new(200).set_body_raw("{\"choices\": [", "application/json"),
    )
    .await;

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Broken", url, "openai")])
        .await;
    assert_eq!(results[0].status, ResultStatus::NonJsonResponse);
    assert!(results[0].response_text.contains("not valid JSON"));
}

#[tokio::test]
async fn upstream_error_envelope_is_reported() {
    let server = MockServer::start().await;
    let url = mount_at(
        &server,
        CHAT_PATH,
        ResponseTemplate::new(200)
            .set_body_json(json!({"error": {"message": "Insufficient credits", "code": 402}})),
    )
    .await;

    let results = dispatcher()
        .dispatch("hi", &[provider(1, "Broke", url, "openrouter")])
        .await;
    assert_eq!(results[0].status, ResultStatus::UpstreamError);
    assert!(results[0].response_text.ends_with("Insufficient credits"));
}

#[tokio::test]
async fn http_status_codes_are_explained() {
    let server = MockServer::start().await;
    let unauthorized = mount_at(
        &server,
        "/401",
        ResponseTemplate::new(401)
            .set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
    )
    .await;
    let limited = mount_at(&server, "/429", ResponseTemplate::new(429)).await;
    let teapot = mount_at(&server, "/418", ResponseTemplate::new(418)).await;

    let results = dispatcher()
        .dispatch(
            "hi",
            &[
                provider(1, "Unauthorized", unauthorized, "openai"),
                provider(2, "Limited", limited, "openai"),
                provider(3, "Teapot", teapot, "openai"),
            ],
        )
        .await;

    assert!(results.iter().all(|r| r.status == ResultStatus::HttpStatusError));
    assert!(results[0].response_text.contains("invalid credential (HTTP 401)"));
    assert!(results[0].response_text.contains("Incorrect API key provided"));
    assert!(results[1].response_text.contains("rate limited (HTTP 429)"));
    assert_eq!(results[2].response_text, "Error: Teapot: HTTP 418");
}

#[tokio::test]
async fn display_names_round_trip_for_every_kind() {
    let server = MockServer::start().await;
    let url = mount_at(&server, CHAT_PATH, completion("ok")).await;

    let providers: Vec<_> = ProviderKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let name = format!("  Модель «{kind}» #{i}\t");
            provider(i as u64 + 1, &name, url.clone(), kind.as_str())
        })
        .collect();

    let results = dispatcher().dispatch("hi", &providers).await;
    assert_eq!(results.len(), providers.len());
    for (result, config) in results.iter().zip(&providers) {
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.provider_display_name.as_bytes(), config.display_name.as_bytes());
    }
}

#[tokio::test]
async fn repeated_dispatch_is_structurally_identical() {
    let server = MockServer::start().await;
    let ok = mount_at(&server, "/ok", completion("same answer")).await;
    let failing = mount_at(&server, "/fail", ResponseTemplate::new(500)).await;
    let mut keyless = provider(3, "Keyless", format!("{}/ok", server.uri()), "groq");
    keyless.credential_ref = "MISSING".to_owned();

    let providers = [
        provider(1, "Ok", ok, "openai"),
        provider(2, "Failing", failing, "deepseek"),
        keyless,
    ];
    let engine = dispatcher();
    let first: Vec<ModelResult> = engine.dispatch("same prompt", &providers).await;
    let second: Vec<ModelResult> = engine.dispatch("same prompt", &providers).await;

    assert_eq!(first, second);
    let statuses: Vec<_> = first.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [
            ResultStatus::Success,
            ResultStatus::HttpStatusError,
            ResultStatus::MissingCredential
        ]
    );
}

#[tokio::test]
async fn bad_request_and_forbidden_get_guidance() {
    let server = MockServer::start().await;
    let rejected = mount_at(
        &server,
        "/400",
        ResponseTemplate::new(400)
            .set_body_json(json!({"error": {"message": "model 'model-1' does not exist"}})),
    )
    .await;
    let blocked = mount_at(
        &server,
        "/403",
        ResponseTemplate::new(403).set_body_string("Country, region, or territory not supported"),
    )
    .await;

    let results = dispatcher()
        .dispatch(
            "hi",
            &[
                provider(1, "Rejected", rejected, "openai"),
                provider(2, "Blocked", blocked, "openai"),
            ],
        )
        .await;

    assert!(results.iter().all(|r| r.status == ResultStatus::HttpStatusError));
    assert!(results[0].response_text.contains("bad request (HTTP 400)"));
    assert!(results[0].response_text.ends_with("model 'model-1' does not exist"));
    assert!(results[1].response_text.contains("access forbidden (HTTP 403)"));
    assert!(results[1].response_text.ends_with("territory not supported"));
}

#[tokio::test]
async fn panicking_provider_task_leaves_neighbours_intact() {
    let server = MockServer::start().await;
    let first = mount_at(&server, "/first", completion("first answer")).await;
    let last = mount_at(&server, "/last", completion("last answer")).await;
    let mut exploding = provider(2, "Exploding", format!("{}/never", server.uri()), "openai");
    exploding.credential_ref = "EXPLODING_KEY".to_owned();

    let engine = Dispatcher::new(EngineContext::new(
        Arc::new(Settings::new().with("timeout", "5")),
        Arc::new(PanickingCredentials {
            inner: StaticCredentials::new().with(KEY_NAME, KEY),
        }),
    ))
    .expect("client should build");
    let results = engine
        .dispatch(
            "hi",
            &[
                provider(1, "First", first, "openai"),
                exploding,
                provider(3, "Last", last, "groq"),
            ],
        )
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].response_text, "first answer");

    assert_eq!(results[1].provider_display_name, "Exploding");
    assert_eq!(results[1].status, ResultStatus::UnexpectedError);
    assert!(results[1]
        .response_text
        .starts_with("Error: unexpected error from Exploding"));
    assert!(results[1].response_text.contains("panicked"), "{}", results[1].response_text);

    assert_eq!(results[2].status, ResultStatus::Success);
    assert_eq!(results[2].response_text, "last answer");
}

#[tokio::test]
async fn oversized_timeout_setting_falls_back_to_default() {
    let server = MockServer::start().await;
    let url = mount_at(&server, CHAT_PATH, completion("still works")).await;

    let results = dispatcher_with(Settings::new().with("timeout", "1e30"))
        .dispatch("hi", &[provider(1, "Patient", url, "openai")])
        .await;

    assert_eq!(results[0].status, ResultStatus::Success);
    assert_eq!(results[0].response_text, "still works");
}
