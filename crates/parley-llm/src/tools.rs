//! Tool naming and provider-neutral tool specs.
//!
//! A tool is offered to the model as `{server}_{tool}`. Server ids are
//! sanitized without `_`, so the first `_` always separates the two parts.

use parley_types::{ToolDefinition, ToolServer};

/// Separator between the server and tool parts of a synthesized name.
pub const TOOL_NAME_DELIMITER: char = '_';

/// A tool as offered to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Synthesized `{server}_{tool}` name.
    pub name: String,
    /// Declared description enriched with the parameter list.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Naming
// ─────────────────────────────────────────────────────────────────────────────

/// Map every character outside `[A-Za-z0-9.-]` to `-`.
pub fn sanitize_server_id(id: &str) -> String {
    id.chars()
        .map(|c| if is_server_char(c) { c } else { '-' })
        .collect()
}

/// Map every character outside `[A-Za-z0-9_.-]` to `_`.
pub fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_tool_char(c) { c } else { '_' })
        .collect()
}

/// Build the model-facing name for a tool on a server.
pub fn synthesize_tool_name(server_id: &str, tool_name: &str) -> String {
    format!(
        "{}{}{}",
        sanitize_server_id(server_id),
        TOOL_NAME_DELIMITER,
        sanitize_tool_name(tool_name)
    )
}

/// Split a synthesized name on its first delimiter.
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(TOOL_NAME_DELIMITER)
}

/// Check a synthesized name: both parts non-empty, allowed charset only.
pub fn is_valid_tool_name(name: &str) -> bool {
    match split_tool_name(name) {
        Some((server, tool)) => {
            !server.is_empty()
                && !tool.is_empty()
                && server.chars().all(is_server_char)
                && tool.chars().all(is_tool_char)
        }
        None => false,
    }
}

fn is_server_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

fn is_tool_char(c: char) -> bool {
    is_server_char(c) || c == '_'
}

// ─────────────────────────────────────────────────────────────────────────────
// Specs
// ─────────────────────────────────────────────────────────────────────────────

/// The declared description followed by a parameter list from the schema.
pub fn describe_tool(tool: &ToolDefinition) -> String {
    let mut output = tool.description.trim().to_string();

    let Some(props) = tool
        .input_schema
        .get("properties")
        .and_then(|p| p.as_object())
        .filter(|p| !p.is_empty())
    else {
        return output;
    };

    let required: Vec<&str> = tool
        .input_schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    if !output.is_empty() {
        output.push_str("\n\n");
    }
    output.push_str("Parameters:");
    for (name, schema) in props {
        let type_str = schema.get("type").and_then(|t| t.as_str()).unwrap_or("any");
        let desc = schema
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("");
        let requirement = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        output.push_str(&format!("\n- {} ({}, {}): {}", name, type_str, requirement, desc));
    }
    output
}

/// Build specs for every tool on the given servers.
///
/// Tools whose synthesized name fails validation are dropped.
pub fn build_tool_specs(servers: &[ToolServer]) -> Vec<ToolSpec> {
    let mut specs = Vec::new();
    for server in servers {
        for tool in &server.tools {
            let name = synthesize_tool_name(&server.id, &tool.name);
            if !is_valid_tool_name(&name) {
                tracing::warn!(
                    server = %server.id,
                    tool = %tool.name,
                    synthesized = %name,
                    "Dropping tool with invalid name"
                );
                continue;
            }
            specs.push(ToolSpec {
                name,
                description: describe_tool(tool),
                parameters: tool.input_schema.clone(),
            });
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_server_id("my_server 1"), "my-server-1");
        assert_eq!(sanitize_tool_name("get weather!"), "get_weather_");
        assert_eq!(synthesize_tool_name("a_b", "c_d"), "a-b_c_d");
    }

    #[test]
    fn test_split_recovers_server_id() {
        let name = synthesize_tool_name("calc_v2", "add_numbers");
        assert_eq!(split_tool_name(&name), Some(("calc-v2", "add_numbers")));
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_tool_name("srv_tool"));
        assert!(is_valid_tool_name("srv.v1_tool_x"));
        assert!(!is_valid_tool_name("_tool"));
        assert!(!is_valid_tool_name("srv_"));
        assert!(!is_valid_tool_name("notool"));
        assert!(!is_valid_tool_name("srv_tööl"));
    }

    #[test]
    fn test_describe_tool() {
        let tool = ToolDefinition::new("search", "Search the web.").with_schema(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search terms"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        }));
        let desc = describe_tool(&tool);
        assert!(desc.starts_with("Search the web.\n\nParameters:"));
        assert!(desc.contains("- query (string, required): Search terms"));
        assert!(desc.contains("- limit (integer, optional): "));

        let bare = ToolDefinition::new("ping", "Ping.");
        assert_eq!(describe_tool(&bare), "Ping.");
    }

    #[test]
    fn test_build_tool_specs_drops_invalid() {
        let servers = vec![
            ToolServer::new("weather", "http://w")
                .with_tool(ToolDefinition::new("forecast", "Forecast"))
                .with_tool(ToolDefinition::new("", "Nameless")),
            ToolServer::new("", "http://x").with_tool(ToolDefinition::new("orphan", "")),
        ];
        let specs = build_tool_specs(&servers);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "weather_forecast");
    }
}
