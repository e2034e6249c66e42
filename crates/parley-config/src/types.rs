//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]            # HTTP listener
//! [orchestrator]      # tool round limit
//! [preprocessor]      # redaction terms and injection markers
//! [proxy]             # optional remote tool proxy
//! [provider]          # timeouts and retries for provider calls
//! [logging]           # optional JSON log file
//! [[tool_servers]]    # statically configured tool servers
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_types::{ToolDefinition, ToolServer, ToolServerConfig};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8787;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default tool round limit per turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub server: Option<ServerConfig>,
    pub orchestrator: Option<OrchestratorSection>,
    pub preprocessor: Option<PreprocessorSection>,
    pub proxy: Option<ProxyConfig>,
    pub provider: Option<ProviderSection>,
    pub logging: Option<LoggingConfig>,

    /// Tool servers offered to the model.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_servers: Vec<ToolServerEntry>,
}

impl ParleyConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole. Tool servers are matched by id: a
    /// later entry replaces an earlier one with the same id, new ids are
    /// appended.
    pub fn merge(&mut self, other: ParleyConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.orchestrator.is_some() {
            self.orchestrator = other.orchestrator;
        }

        if other.preprocessor.is_some() {
            self.preprocessor = other.preprocessor;
        }

        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }

        if other.provider.is_some() {
            self.provider = other.provider;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }

        for entry in other.tool_servers {
            match self.tool_servers.iter_mut().find(|s| s.id == entry.id) {
                Some(existing) => *existing = entry,
                None => self.tool_servers.push(entry),
            }
        }
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn orchestrator(&self) -> OrchestratorSection {
        self.orchestrator.clone().unwrap_or_default()
    }

    pub fn preprocessor(&self) -> PreprocessorSection {
        self.preprocessor.clone().unwrap_or_default()
    }

    pub fn provider(&self) -> ProviderSection {
        self.provider.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Remote tool proxy URL, if one is configured.
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy
            .as_ref()
            .and_then(|p| p.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    /// Configured tool servers as runtime descriptors.
    pub fn tool_servers(&self) -> Vec<ToolServer> {
        self.tool_servers
            .iter()
            .map(ToolServerEntry::to_tool_server)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            cors: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Maximum tool rounds per turn.
    pub max_rounds: u32,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Input preprocessing settings. Unset fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorSection {
    pub sensitive_terms: Vec<String>,
    pub discussion_markers: Option<Vec<String>>,
    pub blocked_marker: Option<String>,
}

/// Remote tool proxy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of a server exposing `/api/mcp/call`. When unset, tool
    /// calls go through the in-process gateway.
    pub url: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Transport settings shared by every provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
    /// Retries on rate limiting.
    pub max_retries: u32,
    /// Initial backoff between retries, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ProviderSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write JSON logs to a daily rolling file.
    pub file: bool,
    /// Directory for log files. Defaults to the platform data dir.
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Directory the log file layer writes into.
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("parley").join("logs")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Servers
// ─────────────────────────────────────────────────────────────────────────────

/// A `[[tool_servers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Per-server values placed into headers or query strings at call time.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl ToolServerEntry {
    /// Statically configured servers are treated as connected.
    pub fn to_tool_server(&self) -> ToolServer {
        let mut server = ToolServer::new(self.id.clone(), self.base_url.clone())
            .with_enabled(self.enabled);
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            server = server.with_name(name);
        }
        for tool in &self.tools {
            server = server.with_tool(tool.clone());
        }
        if !self.parameters.is_empty() {
            server = server.with_config(ToolServerConfig {
                parameters: self.parameters.clone(),
            });
        }
        server
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FULL: &str = r#"
[server]
port = 9000
bind = "0.0.0.0"
cors = false

[orchestrator]
max_rounds = 2

[preprocessor]
sensitive_terms = ["hunter2"]
blocked_marker = "[nope]"

[proxy]
url = "http://proxy.local"

[provider]
timeout_secs = 30
max_retries = 1
retry_backoff_ms = 100

[logging]
file = true
dir = "/var/log/parley"

[[tool_servers]]
id = "calc"
name = "Calculator"
base_url = "http://calc.local"
parameters = { token = "abc", region = 3 }

[[tool_servers.tools]]
name = "add"
description = "Add two numbers"
input_schema = { type = "object", properties = { a = { type = "number" } } }

[[tool_servers]]
id = "search"
base_url = "http://search.local"
enabled = false
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ParleyConfig::from_toml(FULL).unwrap();
        assert_eq!(config.server().port, 9000);
        assert!(!config.server().cors);
        assert_eq!(config.orchestrator().max_rounds, 2);
        assert_eq!(config.preprocessor().sensitive_terms, vec!["hunter2"]);
        assert_eq!(config.preprocessor().discussion_markers, None);
        assert_eq!(config.proxy_url(), Some("http://proxy.local"));
        assert_eq!(config.provider().timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.provider().retry_backoff(), Duration::from_millis(100));
        assert!(config.logging().file);
        assert_eq!(config.tool_servers.len(), 2);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = ParleyConfig::from_toml("").unwrap();
        assert_eq!(config.server(), ServerConfig::default());
        assert_eq!(config.orchestrator().max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(config.provider().max_retries, 3);
        assert!(config.proxy_url().is_none());
        assert!(config.tool_servers().is_empty());
    }

    #[test]
    fn test_tool_server_conversion() {
        let config = ParleyConfig::from_toml(FULL).unwrap();
        let servers = config.tool_servers();

        let calc = &servers[0];
        assert_eq!(calc.display_name(), "Calculator");
        assert!(calc.is_eligible());
        assert_eq!(calc.tools[0].name, "add");
        assert_eq!(
            calc.tools[0].input_schema["properties"]["a"],
            json!({"type": "number"})
        );
        let params = &calc.config.as_ref().unwrap().parameters;
        assert_eq!(params["token"], json!("abc"));
        assert_eq!(params["region"], json!(3));

        let search = &servers[1];
        assert_eq!(search.display_name(), "search");
        assert!(!search.is_eligible());
        assert!(search.config.is_none());
    }

    #[test]
    fn test_merge_replaces_sections_and_matches_servers_by_id() {
        let mut base = ParleyConfig::from_toml(FULL).unwrap();
        let overlay = ParleyConfig::from_toml(
            r#"
[server]
port = 3000

[[tool_servers]]
id = "search"
base_url = "http://search.internal"

[[tool_servers]]
id = "weather"
base_url = "http://weather.local"
"#,
        )
        .unwrap();

        base.merge(overlay);

        // Sections are replaced whole, so unset fields return to defaults.
        assert_eq!(base.server().port, 3000);
        assert_eq!(base.server().bind, DEFAULT_BIND);
        assert_eq!(base.orchestrator().max_rounds, 2);

        let ids: Vec<_> = base.tool_servers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["calc", "search", "weather"]);
        assert_eq!(base.tool_servers[1].base_url, "http://search.internal");
        assert!(base.tool_servers[1].enabled);
    }

    #[test]
    fn test_toml_roundtrip_keeps_tool_servers() {
        let config = ParleyConfig::from_toml(FULL).unwrap();
        let reparsed = ParleyConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed.tool_servers, config.tool_servers);
        assert_eq!(reparsed.server, config.server);
    }

    #[test]
    fn test_blank_proxy_url_is_ignored() {
        let config = ParleyConfig::from_toml("[proxy]\nurl = \"  \"\n").unwrap();
        assert!(config.proxy_url().is_none());
    }
}
