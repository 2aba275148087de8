//! Configuration loading
//!
//! Sources, lowest priority first:
//! 1. `config/default.toml` compiled into the binary
//! 2. `config/{TASKCHAIN_ENV}.toml` and `config/local.toml`, if present
//! 3. The file passed with `--config`, which must exist
//! 4. `TASKCHAIN_<SECTION>__<KEY>` environment variables

use super::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration, optionally layering an explicit file
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let env_name = std::env::var("TASKCHAIN_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name(&format!("config/{}", env_name)).required(false))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path).required(true));
    }

    // prefix_separator("_") so TASKCHAIN_SCHEDULER__WORKERS maps to scheduler.workers
    let config = builder
        .add_source(
            Environment::with_prefix("TASKCHAIN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| match explicit {
            Some(path) => format!("Failed to build configuration with {}", path.display()),
            None => "Failed to build configuration".to_string(),
        })?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
