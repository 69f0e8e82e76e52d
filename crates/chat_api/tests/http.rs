use chat_api::headers::{HEADER_API_KEY, HEADER_AUTHORIZATION};
use chat_api::{ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, ChatRequestMessage};

fn request() -> ChatRequest {
    ChatRequest::new(
        "gpt-4o",
        vec![
            ChatRequestMessage::new("system", "respond with JSON"),
            ChatRequestMessage::new("user", "build a page"),
        ],
    )
    .with_json_object_response()
}

#[test]
fn http_request_builds_openai_endpoint_with_bearer_auth() {
    let config = ChatApiConfig::new("sk-test", "gpt-4o").with_base_url("https://api.openai.com/v1");
    let client = ChatApiClient::new(config).expect("client");

    let http_request = client
        .build_request(&request())
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(
        http_request.url().as_str(),
        "https://api.openai.com/v1/chat/completions"
    );
    assert_eq!(http_request.method(), "POST");
    assert_eq!(
        http_request.headers()[HEADER_AUTHORIZATION],
        "Bearer sk-test"
    );
    assert!(http_request.headers().get(HEADER_API_KEY).is_none());

    let body = http_request
        .body()
        .and_then(|body| body.as_bytes())
        .expect("json body");
    let body: serde_json::Value = serde_json::from_slice(body).expect("valid json");
    assert_eq!(body["stream"], true);
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(body["messages"][1]["role"], "user");
}

#[test]
fn http_request_uses_api_key_header_for_azure() {
    let config = ChatApiConfig::new("azure-key", "gpt-4o")
        .with_base_url("https://example.openai.azure.com")
        .with_api_version("2024-05-01-preview");
    let client = ChatApiClient::new(config).expect("client");

    let http_request = client
        .build_request(&request())
        .expect("build request")
        .build()
        .expect("request");

    assert_eq!(http_request.headers()[HEADER_API_KEY], "azure-key");
    assert!(http_request.headers().get(HEADER_AUTHORIZATION).is_none());
    assert_eq!(
        http_request.url().query(),
        Some("api-version=2024-05-01-preview")
    );
}

#[test]
fn http_request_rejects_missing_api_key() {
    let client = ChatApiClient::new(ChatApiConfig::new("  ", "gpt-4o")).expect("client");
    let error = client
        .build_request(&request())
        .err()
        .expect("blank key must fail");
    assert!(matches!(error, ChatApiError::MissingApiKey));
}

#[test]
fn http_request_rejects_empty_message_list() {
    let client = ChatApiClient::new(ChatApiConfig::new("sk-test", "gpt-4o")).expect("client");
    let error = client
        .build_request(&ChatRequest::new("gpt-4o", Vec::new()))
        .err()
        .expect("empty messages must fail");
    assert!(matches!(error, ChatApiError::InvalidRequestPayload(_)));
}

#[test]
fn stream_event_variant_names_stable() {
    let delta = chat_api::ChatStreamEvent::ContentDelta {
        delta: "hello".to_string(),
    };
    let delta_json = serde_json::to_value(&delta).expect("serialize delta event");
    assert_eq!(delta_json["type"], "content.delta");
    assert_eq!(delta_json["delta"], "hello");

    let finished = chat_api::ChatStreamEvent::Finished {
        reason: Some(chat_api::FinishReason::ContentFilter),
    };
    let finished_json = serde_json::to_value(&finished).expect("serialize finished event");
    assert_eq!(finished_json["type"], "choice.finished");
    assert_eq!(finished_json["reason"], "content_filter");
}
