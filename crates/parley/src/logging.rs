//! Tracing setup: human-readable stderr output plus an optional rolling
//! JSON log file.

use anyhow::{Context as _, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use parley_config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "parley.log";

/// Workspace crates that get the chosen level; everything else is quieter.
const CRATES: &[&str] = &[
    "parley",
    "parley_agent",
    "parley_client",
    "parley_config",
    "parley_llm",
    "parley_mcp",
    "parley_server",
];

fn directives(level: &str, rest: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{}={}", c, level)).collect();
    parts.push(rest.to_string());
    parts.join(",")
}

/// Console filter: `RUST_LOG` when set, else debug with `--verbose`, else info.
fn console_filter(verbose: bool) -> EnvFilter {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::new(spec),
        _ if verbose => EnvFilter::new(directives("debug", "info")),
        _ => EnvFilter::new(directives("info", "warn")),
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(verbose: bool, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter(verbose));

    let dir = if config.file {
        config.resolved_dir()
    } else {
        None
    };

    let (file_layer, guard) = match &dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(directives("trace", "info")));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    if config.file && dir.is_none() {
        tracing::warn!("File logging enabled but no log directory could be determined");
    }
    if let Some(dir) = &dir {
        tracing::debug!(dir = %dir.display(), "Writing JSON logs");
    }

    Ok(guard)
}
