//! Path resolution for pvekit
//!
//! # Environment Variables
//!
//! - `PVEKIT_CONFIG` - Path of the config file (same as `--config`)
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. `--config` argument
//! 2. `PVEKIT_CONFIG` environment variable
//! 3. `XDG_CONFIG_HOME/pvekit/config.toml` (if set)
//! 4. `~/.config/pvekit/config.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config file override
pub const ENV_CONFIG: &str = "PVEKIT_CONFIG";

const CONFIG_FILE: &str = "config.toml";

/// Get the pvekit config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config.is_empty()
    {
        let path = PathBuf::from(xdg_config).join("pvekit");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("pvekit"))
}

/// Resolve the config file path.
///
/// `explicit` is the `--config` argument; clap already folds `PVEKIT_CONFIG`
/// into it, the env lookup here covers callers that bypass the CLI.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }

    if let Ok(path) = std::env::var(ENV_CONFIG)
        && !path.is_empty()
    {
        let path = expand(&path);
        log::debug!("Using config file from {}: {}", ENV_CONFIG, path.display());
        return Ok(path);
    }

    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
