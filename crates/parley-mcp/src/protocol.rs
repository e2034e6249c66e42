//! Wire types for the tool-invocation proxy and tool-server discovery.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_types::{ToolServer, ToolServerConfig};

use crate::error::{McpError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Proxy Contract
// ─────────────────────────────────────────────────────────────────────────────

/// A request to invoke one tool on one tool server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    #[serde(default)]
    pub server_id: String,
    #[serde(default)]
    pub server_base_url: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_config: Option<ToolServerConfig>,
}

impl ToolCallRequest {
    pub fn new(
        server_base_url: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            server_base_url: server_base_url.into(),
            tool_name: tool_name.into(),
            arguments,
            ..Default::default()
        }
    }

    /// Target a tool on a known server, carrying its id and config.
    pub fn for_server(server: &ToolServer, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            server_id: server.id.clone(),
            server_base_url: server.base_url.clone(),
            tool_name: tool_name.into(),
            arguments,
            server_config: server.config.clone(),
        }
    }

    pub fn with_server_config(mut self, config: ToolServerConfig) -> Self {
        self.server_config = Some(config);
        self
    }

    /// Reject requests lacking a base URL or tool name.
    pub fn validate(&self) -> Result<()> {
        if self.server_base_url.trim().is_empty() || self.tool_name.trim().is_empty() {
            return Err(McpError::invalid_request(
                "Missing serverBaseUrl or toolName",
            ));
        }
        Ok(())
    }
}

/// Outcome of a proxied tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Where a config parameter is placed on the outgoing tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    Header,
    Query,
    BodyJson,
}

/// One entry of a server's `/mcp-config-schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub location: ParameterLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Response of `GET {base}/mcp-config-schema`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSchema {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

/// Response of `GET {base}/mcp/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_type: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl ServerInfo {
    pub fn is_mcp_standard(&self) -> bool {
        self.server_type.as_deref() == Some("mcp_standard") || self.protocol.as_deref() == Some("mcp")
    }
}

/// How a tool server expects to be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    /// `POST {base}/call_tool` with `{tool_name, arguments}`.
    McpStandard,
    /// `POST {base}/tools/{tool}/invoke` with the bare arguments.
    ToolInvoke,
}

impl CallingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::McpStandard => "mcp_standard",
            Self::ToolInvoke => "tool_invoke",
        }
    }
}

impl std::fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_from_camel_case() {
        let req: ToolCallRequest = serde_json::from_value(json!({
            "serverId": "calc",
            "serverBaseUrl": "http://localhost:8001",
            "toolName": "add",
            "arguments": {"a": 1, "b": 2},
            "serverConfig": {"parameters": {"token": "t"}}
        }))
        .unwrap();
        assert_eq!(req.tool_name, "add");
        assert_eq!(req.server_config.unwrap().parameters["token"], "t");
    }

    #[test]
    fn test_validate_requires_url_and_tool() {
        let req: ToolCallRequest = serde_json::from_value(json!({"toolName": "add"})).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing serverBaseUrl or toolName");
        assert!(ToolCallRequest::new("http://x", "add", json!({})).validate().is_ok());
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(ToolCallResponse::ok(json!({"sum": 3}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"sum": 3}}));
        let err = serde_json::to_value(ToolCallResponse::failure("boom")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_config_schema_parsing() {
        let schema: ConfigSchema = serde_json::from_value(json!({
            "server_name": "treehole",
            "parameters": [
                {"name": "token", "location": "header", "header_name": "Authorization", "required": true},
                {"name": "uid", "location": "query", "query_name": "user"},
                {"name": "extra", "location": "body_json"}
            ]
        }))
        .unwrap();
        assert_eq!(schema.parameters.len(), 3);
        assert_eq!(schema.parameters[2].location, ParameterLocation::BodyJson);
    }

    #[test]
    fn test_server_info_detection() {
        let info: ServerInfo = serde_json::from_value(json!({"protocol": "mcp"})).unwrap();
        assert!(info.is_mcp_standard());
        let info: ServerInfo = serde_json::from_value(json!({"server_type": "rest"})).unwrap();
        assert!(!info.is_mcp_standard());
    }
}
