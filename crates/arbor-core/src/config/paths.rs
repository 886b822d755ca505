//! Config and state path resolution helpers.

use std::path::PathBuf;

use anyhow::Context;

pub const CONFIG_FILE_NAME: &str = "arbor.toml";

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(dir.join("arbor").join(CONFIG_FILE_NAME))
}

/// Platform state directory, or the local data directory where none exists.
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .context("Could not determine state directory")?;
    Ok(base.join("arbor"))
}
