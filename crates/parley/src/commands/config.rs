//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, Subcommand};

use parley_config::{LoadedConfig, PROJECT_CONFIG_FILE, ParleyConfig};
use parley_types::ProviderType;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show the user config file path
    Path,

    /// Write a starter config file
    Init {
        /// Create project-local config (./parley.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(&ctx.loaded),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::Init { local } => cmd_init(local),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    println!("# Parley Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let server = config.server();
    println!("Server:");
    println!("  bind: {}:{}", server.bind, server.port);
    println!("  cors: {}", server.cors);
    println!("  max tool rounds: {}", config.orchestrator().max_rounds);
    match config.proxy_url() {
        Some(url) => println!("  tool calls via: {}", url),
        None => println!("  tool calls via: built-in gateway"),
    }
    println!();

    println!("Provider keys:");
    for provider in ProviderType::ALL {
        println!("  {:<12} {}", provider.name(), key_status(provider));
    }
    println!();

    let servers = config.tool_servers();
    if servers.is_empty() {
        println!("No tool servers configured\n");
    } else {
        println!("Tool servers:");
        for server in &servers {
            let state = if server.enabled { "" } else { "  (disabled)" };
            println!(
                "  {:<12} {}  {} tool(s){}",
                server.id,
                server.base_url,
                server.tools.len(),
                state
            );
        }
        println!();
    }

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }

    Ok(())
}

/// Which fallback environment variable, if any, supplies a key.
fn key_status(provider: ProviderType) -> String {
    match provider
        .fallback_env_vars()
        .iter()
        .find(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()))
    {
        Some(var) => format!("(env {} ✓)", var),
        None => "(no key)".to_string(),
    }
}

fn cmd_which(loaded: &LoadedConfig) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'parley config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn cmd_path() -> Result<()> {
    match parley_config::user_config_path() {
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        parley_config::user_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    // Parse the template once so a broken template never reaches disk.
    ParleyConfig::from_toml(TEMPLATE).context("built-in config template is invalid")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, TEMPLATE).with_context(|| format!("writing {}", path.display()))?;

    println!("Created config file: {}", path.display());
    Ok(())
}

const TEMPLATE: &str = r#"# Parley Configuration

[server]
port = 8787
bind = "127.0.0.1"
cors = true

[orchestrator]
max_rounds = 5

[provider]
max_retries = 3
retry_backoff_ms = 500
# timeout_secs = 120

# [preprocessor]
# sensitive_terms = ["Project Falcon"]

# Forward tool calls to another Parley server instead of calling tool
# servers directly.
# [proxy]
# url = "http://localhost:8787"

# [logging]
# file = true

# [[tool_servers]]
# id = "calculator"
# base_url = "http://localhost:9000"
#
# [[tool_servers.tools]]
# name = "add"
# description = "Add two numbers"
# input_schema = { type = "object", properties = { a = { type = "number" }, b = { type = "number" } } }
"#;
