//! In-process gateway to HTTP tool servers.
//!
//! Tool servers come in two flavours. The gateway probes each server before
//! calling it and then places the caller's config parameters where the
//! server's own schema says they belong.
//!
//! ```text
//! GET /mcp-config-schema ── ok ──► mcp_standard (+ parameter schema)
//!        │ fail
//! GET /mcp/info ─────────── ok, mcp ──► mcp_standard
//!        │ fail
//! GET /tools ────────────── ok ──► mcp_standard
//!        │ fail
//!        └────────────────────────► tool_invoke
//! ```

use std::time::Duration;

use serde_json::{Value, json};

use parley_types::ToolServerConfig;

use crate::error::{McpError, Result};
use crate::protocol::{
    CallingConvention, ConfigSchema, ParameterDefinition, ParameterLocation, ServerInfo,
    ToolCallRequest,
};

/// Detected calling convention of a tool server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerProfile {
    pub convention: CallingConvention,
    /// Parameter placement, present only when the server publishes a schema.
    pub parameters: Option<Vec<ParameterDefinition>>,
}

/// Config values resolved into request headers and query pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacedParameters {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

/// Gateway that invokes tools on HTTP tool servers.
#[derive(Debug, Clone)]
pub struct McpGateway {
    client: reqwest::Client,
}

impl McpGateway {
    /// A gateway with no request timeout.
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// A gateway whose tool calls time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Probe a server's calling convention.
    ///
    /// Probe failures are never errors; the last resort is `tool_invoke`.
    pub async fn detect(&self, base_url: &str) -> ServerProfile {
        let base = trim_base(base_url);

        if let Some(schema) = self.probe::<ConfigSchema>(&format!("{}/mcp-config-schema", base)).await {
            tracing::debug!(
                url = %base,
                server_name = %schema.server_name,
                parameters = schema.parameters.len(),
                "tool server publishes a config schema"
            );
            return ServerProfile {
                convention: CallingConvention::McpStandard,
                parameters: Some(schema.parameters),
            };
        }

        if let Some(info) = self.probe::<ServerInfo>(&format!("{}/mcp/info", base)).await {
            if info.is_mcp_standard() {
                return ServerProfile {
                    convention: CallingConvention::McpStandard,
                    parameters: None,
                };
            }
        }

        if self.probe_ok(&format!("{}/tools", base)).await {
            return ServerProfile {
                convention: CallingConvention::McpStandard,
                parameters: None,
            };
        }

        ServerProfile {
            convention: CallingConvention::ToolInvoke,
            parameters: None,
        }
    }

    async fn probe<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = self.client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json::<T>().await.ok()
    }

    async fn probe_ok(&self, url: &str) -> bool {
        matches!(self.client.get(url).send().await, Ok(r) if r.status().is_success())
    }

    /// Invoke one tool and return the server's JSON response.
    pub async fn call_tool(&self, request: &ToolCallRequest) -> Result<Value> {
        request.validate()?;
        let base = trim_base(&request.server_base_url);
        let profile = self.detect(base).await;

        let (url, body) = match profile.convention {
            CallingConvention::McpStandard => (
                format!("{}/call_tool", base),
                json!({ "tool_name": request.tool_name, "arguments": request.arguments }),
            ),
            CallingConvention::ToolInvoke => {
                (tool_invoke_url(base, &request.tool_name)?, request.arguments.clone())
            }
        };

        let placed = match (&request.server_config, &profile.parameters) {
            (Some(config), Some(schema)) => place_parameters(config, schema),
            _ => PlacedParameters::default(),
        };

        tracing::info!(
            server = %request.server_id,
            tool = %request.tool_name,
            convention = %profile.convention,
            url = %url,
            "proxying tool call"
        );

        let mut builder = self.client.post(&url).json(&body);
        if !placed.query.is_empty() {
            builder = builder.query(&placed.query);
        }
        for (name, value) in &placed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = McpError::upstream(status.as_u16(), &text);
            tracing::warn!(
                server = %request.server_id,
                tool = %request.tool_name,
                status = status.as_u16(),
                error = %err,
                "tool server call failed"
            );
            return Err(err);
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// `{base}/tools/{tool}/invoke` with the tool name as one encoded segment.
fn tool_invoke_url(base: &str, tool_name: &str) -> Result<String> {
    let mut url = url::Url::parse(base)
        .map_err(|e| McpError::invalid_request(format!("invalid server URL '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| McpError::invalid_request(format!("invalid server URL '{}'", base)))?
        .pop_if_empty()
        .extend(["tools", tool_name, "invoke"]);
    Ok(url.to_string())
}

/// Place config values into headers and query pairs per the server schema.
///
/// Null and empty values are skipped; non-string values are stringified.
/// `body_json` parameters are not placed.
pub fn place_parameters(
    config: &ToolServerConfig,
    schema: &[ParameterDefinition],
) -> PlacedParameters {
    let mut placed = PlacedParameters::default();
    for def in schema {
        let Some(value) = config.parameters.get(&def.name).and_then(stringify) else {
            continue;
        };
        match (def.location, &def.header_name, &def.query_name) {
            (ParameterLocation::Header, Some(header), _) => {
                placed.headers.push((header.clone(), value));
            }
            (ParameterLocation::Query, _, Some(query)) => {
                placed.query.push((query.clone(), value));
            }
            _ => {}
        }
    }
    placed
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
