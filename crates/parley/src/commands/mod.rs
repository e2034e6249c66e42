//! CLI command handlers.

use std::path::Path;

use anyhow::{Context as _, Result};

use parley_config::{ConfigSource, LoadedConfig};

pub mod call_tool;
pub mod chat;
pub mod config;
pub mod serve;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
}

/// Load an explicit config file, or discover and merge the config layers.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => {
            let config = parley_config::load_config_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            Ok(LoadedConfig {
                config,
                sources: vec![ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                }],
                warnings: Vec::new(),
            })
        }
        None => parley_config::load_config(None).context("discovering config"),
    }
}
