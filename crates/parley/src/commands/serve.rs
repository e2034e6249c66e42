//! Serve command - runs the chat streaming server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;

use parley_agent::{InputPreprocessor, Orchestrator, OrchestratorConfig, PreprocessorConfig};
use parley_config::{ParleyConfig, PreprocessorSection, ProviderSection};
use parley_llm::{ProviderRegistry, TransportSettings};
use parley_mcp::{HttpToolProxy, McpGateway, SharedToolProxy};
use parley_server::{AppState, Server, ServerConfig};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Forward tool calls to this server's /api/mcp/call (overrides config)
    #[arg(long)]
    pub tool_proxy: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;

    if ctx.verbose {
        let sources = ctx.loaded.loaded_from();
        if sources.is_empty() {
            println!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                println!("Loaded config: {}", source.display());
            }
        }
    }

    let addr = bind_address(config, &args)?;
    let orchestrator = build_orchestrator(config, args.tool_proxy.as_deref())?;
    let gateway: SharedToolProxy =
        Arc::new(McpGateway::new().context("creating tool gateway")?);

    let server_config = ServerConfig::new()
        .with_bind_address(addr)
        .with_cors(config.server().cors);
    let server = Server::from_state(AppState::new(orchestrator, gateway, server_config));

    println!("Parley server starting on http://{}", addr);
    println!("Press Ctrl+C to stop");

    server.run().await?;
    Ok(())
}

fn bind_address(config: &ParleyConfig, args: &ServeArgs) -> Result<SocketAddr> {
    let server = config.server();
    let port = args.port.unwrap_or(server.port);
    let bind = args.bind.clone().unwrap_or(server.bind);
    format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", bind, port))
}

/// Wire the provider registry, tool proxy and preprocessor from config.
fn build_orchestrator(config: &ParleyConfig, proxy_override: Option<&str>) -> Result<Orchestrator> {
    let registry = ProviderRegistry::with_defaults().with_transport(transport(&config.provider()));

    let proxy: SharedToolProxy = match proxy_override.or(config.proxy_url()) {
        Some(url) => {
            tracing::info!(url, "Forwarding tool calls to remote proxy");
            Arc::new(HttpToolProxy::new(url).context("creating tool proxy")?)
        }
        None => Arc::new(McpGateway::new().context("creating tool gateway")?),
    };

    let preprocessor = InputPreprocessor::new(preprocessor_config(config.preprocessor()))
        .context("compiling preprocessor patterns")?;

    Ok(Orchestrator::new(registry, proxy)
        .with_config(OrchestratorConfig {
            max_rounds: config.orchestrator().max_rounds,
        })
        .with_preprocessor(preprocessor))
}

fn transport(section: &ProviderSection) -> TransportSettings {
    TransportSettings {
        timeout: section.timeout(),
        max_retries: section.max_retries,
        retry_backoff: section.retry_backoff(),
    }
}

/// Unset fields keep the built-in markers.
fn preprocessor_config(section: PreprocessorSection) -> PreprocessorConfig {
    let mut config = PreprocessorConfig::default().with_sensitive_terms(section.sensitive_terms);
    if let Some(markers) = section.discussion_markers {
        config.discussion_markers = markers;
    }
    if let Some(marker) = section.blocked_marker {
        config.blocked_marker = marker;
    }
    config
}
