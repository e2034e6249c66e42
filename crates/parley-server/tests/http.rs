//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley_agent::Orchestrator;
use parley_llm::{ProviderRegistry, ScriptedAdapter, ScriptedTurn};
use parley_mcp::McpGateway;
use parley_server::{AppState, Server, ServerConfig};
use parley_types::{ChatStreamChunk, ProviderType};

fn app(turns: Vec<ScriptedTurn>, with_key: bool) -> Router {
    let adapter = Arc::new(ScriptedAdapter::new(turns));
    let registry = ProviderRegistry::new()
        .with_factory(ProviderType::Openai, adapter.factory())
        .with_env_lookup(move |var| {
            (with_key && var == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        });
    let gateway = Arc::new(McpGateway::new().unwrap());
    let orchestrator = Orchestrator::new(registry, gateway.clone());
    Server::from_state(AppState::new(orchestrator, gateway, ServerConfig::new())).router()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_value(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn chat_body() -> Value {
    json!({
        "chatId": "chat-1",
        "providerType": "openai",
        "modelId": "gpt-test",
        "messages": [{"role": "user", "content": "hi"}]
    })
}

fn sse_chunks(text: &str) -> Vec<ChatStreamChunk> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat stream
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_stream_emits_one_frame_per_chunk() {
    let app = app(vec![ScriptedTurn::deltas(["Hel", "lo"])], true);

    let response = app
        .oneshot(post("/api/chat/stream", chat_body().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let chunks = sse_chunks(&body_text(response).await);
    let kinds: Vec<_> = chunks.iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec!["message_start", "content_delta", "content_delta", "message_end"]
    );
    let text: String = chunks
        .iter()
        .filter_map(|c| match c {
            ChatStreamChunk::ContentDelta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_chat_stream_rejects_incomplete_requests() {
    let cases = [
        (json!({"providerType": "openai", "modelId": "m"}), "Messages are required"),
        (
            json!({"providerType": "openai", "modelId": "m", "messages": []}),
            "Messages are required",
        ),
        (
            json!({"modelId": "m", "messages": [{"role": "user", "content": "hi"}]}),
            "Provider type is required",
        ),
        (
            json!({"providerType": "openai", "messages": [{"role": "user", "content": "hi"}]}),
            "Model ID is required",
        ),
    ];

    for (body, expected) in cases {
        let response = app(vec![], true)
            .oneshot(post("/api/chat/stream", body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_value(response).await, json!({"error": expected}));
    }
}

#[tokio::test]
async fn test_chat_stream_rejects_unknown_provider_and_bad_json() {
    let mut body = chat_body();
    body["providerType"] = json!("bedrock");
    let response = app(vec![], true)
        .oneshot(post("/api/chat/stream", body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(vec![], true)
        .oneshot(post("/api/chat/stream", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_value(response).await,
        json!({"error": "Invalid request body"})
    );
}

#[tokio::test]
async fn test_chat_stream_missing_credentials_is_server_error() {
    let response = app(vec![ScriptedTurn::text("unused")], false)
        .oneshot(post("/api/chat/stream", chat_body().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_value(response).await;
    assert!(body["error"].as_str().unwrap().contains("Configuration"), "{body}");
}

#[tokio::test]
async fn test_chat_stream_open_failure_is_server_error() {
    let response = app(vec![ScriptedTurn::OpenError("provider down".into())], true)
        .oneshot(post("/api/chat/stream", chat_body().to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_value(response).await;
    assert!(body["error"].as_str().unwrap().contains("provider down"), "{body}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool proxy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mcp_call_returns_tool_data() {
    let tool_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/add/invoke"))
        .and(body_json(json!({"a": 1, "b": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sum": 3})))
        .mount(&tool_server)
        .await;

    let body = json!({
        "serverId": "calc",
        "serverBaseUrl": tool_server.uri(),
        "toolName": "add",
        "arguments": {"a": 1, "b": 2}
    });
    let response = app(vec![], true)
        .oneshot(post("/api/mcp/call", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_value(response).await,
        json!({"success": true, "data": {"sum": 3}})
    );
}

#[tokio::test]
async fn test_mcp_call_passes_through_upstream_status() {
    let tool_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/add/invoke"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad args"))
        .mount(&tool_server)
        .await;

    let body = json!({"serverBaseUrl": tool_server.uri(), "toolName": "add", "arguments": {}});
    let response = app(vec![], true)
        .oneshot(post("/api/mcp/call", body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_value(response).await,
        json!({"success": false, "error": "tool server error: 422 - bad args"})
    );
}

#[tokio::test]
async fn test_mcp_call_rejects_incomplete_requests() {
    let response = app(vec![], true)
        .oneshot(post("/api/mcp/call", json!({"toolName": "add"}).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_value(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Missing serverBaseUrl or toolName"));

    let response = app(vec![], true)
        .oneshot(post("/api/mcp/call", "[]"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_ok() {
    let response = app(vec![], true)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_value(response).await["status"], json!("ok"));
}
