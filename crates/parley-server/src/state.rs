//! Application state shared across handlers.

use std::sync::Arc;

use parley_agent::Orchestrator;
use parley_mcp::SharedToolProxy;

use crate::config::ServerConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Drives chat turns.
    pub orchestrator: Orchestrator,

    /// Serves `/api/mcp/call`.
    pub tool_proxy: SharedToolProxy,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, tool_proxy: SharedToolProxy, config: ServerConfig) -> Self {
        Self {
            orchestrator,
            tool_proxy,
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("config", &self.config)
            .finish()
    }
}
