//! Gateway and proxy tests against mock tool servers.

use std::collections::HashMap;

use parley_mcp::{
    CallingConvention, HttpToolProxy, McpError, McpGateway, ToolCallRequest, ToolProxy,
};
use parley_types::ToolServerConfig;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_detects_schema_server_and_places_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcp-config-schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server_name": "treehole",
            "parameters": [
                {"name": "token", "location": "header", "header_name": "Authorization"},
                {"name": "uid", "location": "query", "query_name": "user"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/call_tool"))
        .and(header("Authorization", "Bearer t0k"))
        .and(query_param("user", "42"))
        .and(body_json(json!({"tool_name": "search", "arguments": {"q": "rust"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = McpGateway::new().unwrap();
    let request = ToolCallRequest::new(format!("{}/", server.uri()), "search", json!({"q": "rust"}))
        .with_server_config(ToolServerConfig {
            parameters: HashMap::from([
                ("token".to_string(), json!("Bearer t0k")),
                ("uid".to_string(), json!(42)),
            ]),
        });

    let result = gateway.call(&request).await.unwrap();
    assert_eq!(result, json!({"hits": 3}));
}

#[tokio::test]
async fn test_detects_info_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcp/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"protocol": "mcp"})))
        .mount(&server)
        .await;

    let profile = McpGateway::new().unwrap().detect(&server.uri()).await;
    assert_eq!(profile.convention, CallingConvention::McpStandard);
    assert!(profile.parameters.is_none());
}

#[tokio::test]
async fn test_detects_tools_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcp/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server_type": "rest"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let profile = McpGateway::new().unwrap().detect(&server.uri()).await;
    assert_eq!(profile.convention, CallingConvention::McpStandard);
}

#[tokio::test]
async fn test_falls_back_to_tool_invoke() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/add/invoke"))
        .and(body_json(json!({"a": 1, "b": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = McpGateway::new().unwrap();
    let result = gateway
        .call(&ToolCallRequest::new(server.uri(), "add", json!({"a": 1, "b": 2})))
        .await
        .unwrap();
    assert_eq!(result["result"], 3);
}

#[tokio::test]
async fn test_upstream_failure_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/call_tool"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "missing field q"})),
        )
        .mount(&server)
        .await;

    let err = McpGateway::new()
        .unwrap()
        .call(&ToolCallRequest::new(server.uri(), "search", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    assert_eq!(err.to_string(), "tool server error: 422 - missing field q");
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let gateway = McpGateway::new().unwrap();
    let err = gateway
        .call(&ToolCallRequest::new("http://127.0.0.1:1", "add", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Transport(_)));
}

#[tokio::test]
async fn test_http_proxy_unwraps_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mcp/call"))
        .and(body_json(json!({
            "serverId": "",
            "serverBaseUrl": "http://tools.local",
            "toolName": "add",
            "arguments": {"a": 1}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": {"sum": 1}})),
        )
        .mount(&server)
        .await;

    let proxy = HttpToolProxy::new(&server.uri()).unwrap();
    let data = proxy
        .call(&ToolCallRequest::new("http://tools.local", "add", json!({"a": 1})))
        .await
        .unwrap();
    assert_eq!(data, json!({"sum": 1}));
}

#[tokio::test]
async fn test_http_proxy_reports_remote_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/mcp/call"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "success": false,
            "error": "tool server error: 502 - Bad Gateway"
        })))
        .mount(&server)
        .await;

    let proxy = HttpToolProxy::new(&server.uri()).unwrap();
    let err = proxy
        .call(&ToolCallRequest::new("http://tools.local", "add", json!({})))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "tool call failed: tool server error: 502 - Bad Gateway"
    );
}

#[tokio::test]
async fn test_http_proxy_rejects_incomplete_request() {
    let proxy = HttpToolProxy::new("http://127.0.0.1:1").unwrap();
    let err = proxy
        .call(&ToolCallRequest::new("", "add", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidRequest(_)));
}
