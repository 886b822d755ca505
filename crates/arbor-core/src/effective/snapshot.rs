//! On-disk snapshot of the group -> root components tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::store::ScopeWinner;
use crate::types::ScopeKey;

pub const SNAPSHOT_FILE_NAME: &str = "group_to_root_components.json";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    #[serde(default)]
    pub next_sequence: u64,
    #[serde(default)]
    pub scopes: BTreeMap<ScopeKey, ScopeWinner>,
}

impl StoreSnapshot {
    fn validate(&self) -> anyhow::Result<()> {
        if self.version != SNAPSHOT_VERSION {
            anyhow::bail!(
                "Unsupported snapshot version {} (expected {})",
                self.version,
                SNAPSHOT_VERSION
            );
        }
        for (key, winner) in &self.scopes {
            if key != &winner.scope_key {
                anyhow::bail!(
                    "Snapshot entry '{}' holds winner for scope '{}'",
                    key,
                    winner.scope_key
                );
            }
            if winner.accepted_sequence >= self.next_sequence {
                anyhow::bail!(
                    "Snapshot entry '{}' has sequence {} beyond next sequence {}",
                    key,
                    winner.accepted_sequence,
                    self.next_sequence
                );
            }
        }
        Ok(())
    }
}

/// Load a snapshot, returning `None` when the file doesn't exist.
pub fn load(path: &Path) -> anyhow::Result<Option<StoreSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
    snapshot
        .validate()
        .with_context(|| format!("Invalid snapshot: {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Save a snapshot atomically (tmp + rename).
pub fn save(path: &Path, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create snapshot directory: {}", parent.display())
        })?;
    }

    let bytes = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;
    let tmp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));

    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write tmp snapshot: {}", tmp_path.display()))?;

    // rename does not replace an existing file on Windows
    if cfg!(windows) && path.exists() {
        fs::remove_file(path).with_context(|| {
            format!("Failed to remove existing snapshot: {}", path.display())
        })?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename tmp snapshot: {}", tmp_path.display()))?;

    Ok(())
}
