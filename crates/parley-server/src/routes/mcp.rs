//! Tool-invocation proxy endpoint.

use axum::{Json, body::Bytes, extract::State};

use parley_mcp::{McpError, ToolCallRequest, ToolCallResponse};

use crate::error::ServerError;
use crate::state::AppState;

/// POST /api/mcp/call
///
/// Failures answer `{success: false, error}` with the upstream status when
/// the tool server returned a 4xx/5xx, 400 for an incomplete request and
/// 500 otherwise.
pub async fn mcp_call_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ToolCallResponse>, ServerError> {
    let request: ToolCallRequest = serde_json::from_slice(&body)
        .map_err(|_| McpError::invalid_request("Invalid request body"))?;
    request.validate()?;

    let data = state.tool_proxy.call(&request).await?;
    Ok(Json(ToolCallResponse::ok(data)))
}
