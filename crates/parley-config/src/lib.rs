//! Configuration for Parley.
//!
//! Provides TOML-based configuration with:
//! - Server, orchestrator, preprocessor and provider transport sections
//! - A statically configured list of tool servers (`[[tool_servers]]`)
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, PROJECT_CONFIG_FILE, load_config, load_config_file,
    load_config_with_options, save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
