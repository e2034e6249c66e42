//! Routing model-issued tool calls to tool servers.
//!
//! The model only sees synthesized names of the form `{server}_{tool}`. The
//! [`ToolDispatcher`] maps such a name back to one of the turn's eligible
//! servers and invokes the tool through a [`ToolProxy`].

use serde_json::Value;

use parley_llm::{sanitize_server_id, sanitize_tool_name, split_tool_name};
use parley_mcp::{SharedToolProxy, ToolCallRequest};
use parley_types::{ToolCall, ToolDefinition, ToolServer};

use crate::error::ToolInvocationError;

/// Dispatches tool calls against a fixed snapshot of eligible servers.
#[derive(Clone)]
pub struct ToolDispatcher {
    proxy: SharedToolProxy,
    servers: Vec<ToolServer>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("servers", &self.servers.iter().map(|s| &s.id).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolDispatcher {
    /// `servers` should already be filtered to the eligible set.
    pub fn new(proxy: SharedToolProxy, servers: Vec<ToolServer>) -> Self {
        Self { proxy, servers }
    }

    pub fn servers(&self) -> &[ToolServer] {
        &self.servers
    }

    fn find_server(&self, server_part: &str) -> Option<&ToolServer> {
        self.servers
            .iter()
            .find(|s| s.id == server_part || sanitize_server_id(&s.id) == server_part)
    }

    /// Resolve a synthesized name to its server and tool definition.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(&ToolServer, &ToolDefinition), ToolInvocationError> {
        let (server_part, tool_part) = split_tool_name(name)
            .ok_or_else(|| ToolInvocationError::InvalidName(name.to_string()))?;
        let server = self
            .find_server(server_part)
            .ok_or_else(|| ToolInvocationError::UnknownServer(server_part.to_string()))?;
        let tool = server
            .tools
            .iter()
            .find(|t| t.name == tool_part || sanitize_tool_name(&t.name) == tool_part)
            .ok_or_else(|| ToolInvocationError::UnknownTool {
                server: server.display_name().to_string(),
                tool: tool_part.to_string(),
            })?;
        Ok((server, tool))
    }

    /// Server name shown in status updates: the resolved display name, or
    /// the raw server part of the tool name.
    pub fn server_label(&self, name: &str) -> String {
        let server_part = split_tool_name(name).map_or(name, |(server, _)| server);
        self.find_server(server_part)
            .map(|s| s.display_name().to_string())
            .unwrap_or_else(|| server_part.to_string())
    }

    /// Invoke one tool call and return its result serialized as JSON text.
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolInvocationError> {
        let (server, tool) = self.resolve(&call.function.name)?;
        let arguments = parse_arguments(&call.function.arguments)?;
        let request = ToolCallRequest::for_server(server, tool.name.clone(), arguments);
        let data = self.proxy.call(&request).await?;
        Ok(data.to_string())
    }
}

/// Empty arguments mean an empty object.
pub fn parse_arguments(raw: &str) -> Result<Value, ToolInvocationError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolInvocationError::MalformedArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parley_mcp::{McpError, ToolProxy};
    use serde_json::json;

    struct EchoProxy;

    #[async_trait]
    impl ToolProxy for EchoProxy {
        async fn call(&self, request: &ToolCallRequest) -> parley_mcp::Result<Value> {
            if request.tool_name == "fail" {
                return Err(McpError::upstream(500, "kaboom"));
            }
            Ok(json!({"tool": request.tool_name, "args": request.arguments, "base": request.server_base_url}))
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let servers = vec![
            ToolServer::new("calc", "http://calc.local")
                .with_name("Calculator")
                .with_tool(ToolDefinition::new("add", "Add numbers"))
                .with_tool(ToolDefinition::new("fail", "Always fails")),
            ToolServer::new("web search", "http://search.local")
                .with_tool(ToolDefinition::new("find pages", "Search")),
        ];
        ToolDispatcher::new(Arc::new(EchoProxy), servers)
    }

    #[test]
    fn test_resolve_sanitized_names() {
        let d = dispatcher();
        let (server, tool) = d.resolve("web-search_find_pages").unwrap();
        assert_eq!(server.id, "web search");
        assert_eq!(tool.name, "find pages");
    }

    #[test]
    fn test_resolve_failures() {
        let d = dispatcher();
        assert!(matches!(d.resolve("nodelimiter"), Err(ToolInvocationError::InvalidName(_))));
        assert!(matches!(d.resolve("srvA_search"), Err(ToolInvocationError::UnknownServer(s)) if s == "srvA"));
        assert!(matches!(d.resolve("calc_mul"), Err(ToolInvocationError::UnknownTool { .. })));
    }

    #[test]
    fn test_server_label() {
        let d = dispatcher();
        assert_eq!(d.server_label("calc_add"), "Calculator");
        assert_eq!(d.server_label("srvA_search"), "srvA");
    }

    #[tokio::test]
    async fn test_invoke_passes_original_names() {
        let d = dispatcher();
        let result = d
            .invoke(&ToolCall::new("c1", "calc_add", r#"{"a":1,"b":2}"#))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["tool"], "add");
        assert_eq!(value["args"], json!({"a": 1, "b": 2}));
        assert_eq!(value["base"], "http://calc.local");
    }

    #[tokio::test]
    async fn test_invoke_errors() {
        let d = dispatcher();
        let err = d.invoke(&ToolCall::new("c1", "calc_add", "{oops")).await.unwrap_err();
        assert!(matches!(err, ToolInvocationError::MalformedArguments(_)));

        let err = d.invoke(&ToolCall::new("c2", "calc_fail", "")).await.unwrap_err();
        assert_eq!(err.to_string(), "tool server error: 500 - kaboom");
    }

    #[test]
    fn test_empty_arguments_are_empty_object() {
        assert_eq!(parse_arguments("  ").unwrap(), json!({}));
    }
}
