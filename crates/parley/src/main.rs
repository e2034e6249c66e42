//! Parley - streaming chat server and client for LLM providers.
//!
//! Main entry point for the Parley CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{call_tool, chat, config, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Parley - streaming chat server and client for LLM providers
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Load this config file instead of discovering config layers
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the chat streaming server
    Serve(serve::ServeArgs),

    /// Send one prompt to a running server and stream the reply
    Chat(chat::ChatArgs),

    /// Invoke a single tool on a tool server
    CallTool(call_tool::CallToolArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load(cli.config.as_deref())?;
    let _guard = logging::init(cli.verbose, &loaded.config.logging())?;

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        verbose: cli.verbose,
        loaded,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::CallTool(args) => call_tool::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["parley", "config", "show", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from(["parley", "serve", "--port", "9000", "--bind", "0.0.0.0"])
            .unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.port, Some(9000));
                assert_eq!(args.bind.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_chat_requires_model() {
        assert!(Cli::try_parse_from(["parley", "chat", "hello"]).is_err());
        let cli =
            Cli::try_parse_from(["parley", "chat", "hello", "--model", "gpt-4o-mini"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.prompt, "hello");
                assert_eq!(args.provider, "openai");
                assert!(!args.no_tools);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_call_tool_needs_a_target() {
        assert!(Cli::try_parse_from(["parley", "call-tool", "--tool", "add"]).is_err());
        assert!(
            Cli::try_parse_from([
                "parley",
                "call-tool",
                "--url",
                "http://localhost:9000",
                "--tool",
                "add"
            ])
            .is_ok()
        );
    }
}
