//! Call-tool command - invoke one tool directly, for checking a tool server.

use anyhow::{Context as _, Result, anyhow, bail};
use clap::Args;
use console::Style;
use serde_json::Value;

use parley_config::ParleyConfig;
use parley_mcp::{HttpToolProxy, McpGateway, SharedToolProxy, ToolCallRequest};
use parley_types::ToolServerConfig;

use super::Context;

/// Arguments for the call-tool command.
#[derive(Args, Debug)]
pub struct CallToolArgs {
    /// Tool server base URL
    #[arg(long, required_unless_present = "server", conflicts_with = "server")]
    pub url: Option<String>,

    /// Id of a tool server from the config file
    #[arg(long)]
    pub server: Option<String>,

    /// Tool name
    #[arg(long, required_unless_present = "detect")]
    pub tool: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,

    /// Server config parameter as KEY=VALUE (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Send the call through a Parley server's /api/mcp/call
    #[arg(long, value_name = "SERVER_URL")]
    pub proxy: Option<String>,

    /// Only report how the tool server expects to be called
    #[arg(long)]
    pub detect: bool,
}

/// Run the call-tool command.
pub async fn run(args: CallToolArgs, ctx: &Context) -> Result<()> {
    let gateway = McpGateway::new().context("creating tool gateway")?;

    if args.detect {
        let (base_url, _) = target(&args, &ctx.loaded.config)?;
        let profile = gateway.detect(&base_url).await;
        println!("convention: {}", profile.convention);
        match profile.parameters {
            Some(params) if !params.is_empty() => {
                println!("parameters:");
                for param in params {
                    println!("  {} ({:?})", param.name, param.location);
                }
            }
            _ => println!("parameters: none published"),
        }
        return Ok(());
    }

    let request = build_request(&args, &ctx.loaded.config)?;
    let proxy: SharedToolProxy = match &args.proxy {
        Some(url) => std::sync::Arc::new(HttpToolProxy::new(url).context("creating tool proxy")?),
        None => std::sync::Arc::new(gateway),
    };

    if ctx.verbose {
        eprintln!(
            "{}",
            Style::new().dim().apply_to(format!(
                "Calling {} on {}",
                request.tool_name, request.server_base_url
            ))
        );
    }

    let result = proxy.call(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Base URL and stored config of the targeted server.
fn target(args: &CallToolArgs, config: &ParleyConfig) -> Result<(String, Option<ToolServerConfig>)> {
    match (&args.url, &args.server) {
        (Some(url), _) => Ok((url.clone(), None)),
        (None, Some(id)) => {
            let server = config
                .tool_servers()
                .into_iter()
                .find(|s| s.id == *id)
                .ok_or_else(|| anyhow!("no tool server '{}' in config", id))?;
            Ok((server.base_url, server.config))
        }
        (None, None) => bail!("either --url or --server is required"),
    }
}

fn build_request(args: &CallToolArgs, config: &ParleyConfig) -> Result<ToolCallRequest> {
    let tool = args
        .tool
        .as_deref()
        .ok_or_else(|| anyhow!("--tool is required"))?;
    let arguments: Value =
        serde_json::from_str(&args.args).context("--args must be a JSON object")?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let (base_url, stored) = target(args, config)?;
    let mut request = ToolCallRequest::new(base_url, tool, arguments);
    if let Some(id) = &args.server {
        request.server_id = id.clone();
    }

    let mut server_config = stored.unwrap_or_default();
    for param in &args.params {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --param '{}', expected KEY=VALUE", param))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        server_config.parameters.insert(key.to_string(), value);
    }
    if !server_config.parameters.is_empty() {
        request = request.with_server_config(server_config);
    }

    Ok(request)
}
