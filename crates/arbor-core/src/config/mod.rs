//! Agent configuration (`arbor.toml`).
//!
//! Every key is optional:
//! - `state_dir`: where the effective configuration snapshot lives
//! - `supported_capabilities`: capability tokens this device honors
//! - `prune_departed_groups`: drop winners of groups the device has left
//! - `memberships`: static group membership used until discovery reports

pub mod parser;
pub mod paths;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capability::DEFAULT_CAPABILITIES;

pub use parser::{load_config, parse_config_str, to_toml};
pub use paths::{CONFIG_FILE_NAME, default_config_path, default_state_dir};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_capabilities")]
    pub supported_capabilities: BTreeSet<String>,

    #[serde(default = "default_prune")]
    pub prune_departed_groups: bool,

    #[serde(default)]
    pub memberships: BTreeSet<String>,
}

fn default_capabilities() -> BTreeSet<String> {
    DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect()
}

fn default_prune() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            supported_capabilities: default_capabilities(),
            prune_departed_groups: default_prune(),
            memberships: BTreeSet::new(),
        }
    }
}

impl AgentConfig {
    /// Load from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        load_config(path)
    }

    /// State directory, falling back to the platform default.
    pub fn resolved_state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_state_dir(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(dir) = &self.state_dir
            && dir.as_os_str().is_empty()
        {
            anyhow::bail!("state_dir must not be empty");
        }
        if let Some(token) = self
            .supported_capabilities
            .iter()
            .find(|token| token.trim().is_empty())
        {
            anyhow::bail!("Invalid capability token '{}'", token);
        }
        if self.memberships.iter().any(|group| group.trim().is_empty()) {
            anyhow::bail!("memberships must not contain empty group names");
        }
        Ok(())
    }
}
