//! The seam the orchestrator calls tools through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{McpError, Result};
use crate::gateway::McpGateway;
use crate::protocol::{ToolCallRequest, ToolCallResponse};

/// Invokes a tool on a tool server and returns its JSON result.
#[async_trait]
pub trait ToolProxy: Send + Sync {
    async fn call(&self, request: &ToolCallRequest) -> Result<Value>;
}

pub type SharedToolProxy = Arc<dyn ToolProxy>;

#[async_trait]
impl ToolProxy for McpGateway {
    async fn call(&self, request: &ToolCallRequest) -> Result<Value> {
        self.call_tool(request).await
    }
}

/// Proxy that forwards calls to a remote `/api/mcp/call` endpoint.
#[derive(Debug, Clone)]
pub struct HttpToolProxy {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpToolProxy {
    /// Forward to `{server_url}/api/mcp/call`.
    pub fn new(server_url: &str) -> Result<Self> {
        Self::build(server_url, None)
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self> {
        Self::build(server_url, Some(timeout))
    }

    fn build(server_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/mcp/call", server_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ToolProxy for HttpToolProxy {
    async fn call(&self, request: &ToolCallRequest) -> Result<Value> {
        request.validate()?;
        tracing::debug!(
            endpoint = %self.endpoint,
            server = %request.server_id,
            tool = %request.tool_name,
            "forwarding tool call"
        );

        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<ToolCallResponse>(&text) {
            Ok(ToolCallResponse { success: true, data, .. }) => Ok(data.unwrap_or(Value::Null)),
            Ok(ToolCallResponse { error, .. }) => Err(McpError::ToolFailed(
                error.unwrap_or_else(|| format!("proxy returned {}", status.as_u16())),
            )),
            Err(_) if !status.is_success() => Err(McpError::upstream(status.as_u16(), &text)),
            Err(e) => Err(e.into()),
        }
    }
}
