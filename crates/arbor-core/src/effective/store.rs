//! Per-scope store of the currently winning deployment.
//!
//! Each scope key maps to exactly one [`ScopeWinner`]. Records are replaced
//! whole under a write lock, so a reader either sees the previous winner or
//! the new one, never a mix. When a snapshot path is configured the new
//! state is written to disk before it becomes visible in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::snapshot::{self, SNAPSHOT_VERSION, StoreSnapshot};
use crate::document::DeploymentDocument;
use crate::types::{ComponentSpecification, ScopeKey};

/// One root component contributed by a scope's winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub version: String,
    /// Group the winning deployment targeted.
    pub group_name: String,
    /// Deployment that introduced this entry.
    pub configuration_id: String,
}

/// The accepted deployment currently in effect for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeWinner {
    pub scope_key: ScopeKey,
    pub deployment_id: String,
    pub target_group: String,
    pub creation_timestamp: i64,
    /// Store-wide acceptance order, assigned on replace.
    #[serde(default)]
    pub accepted_sequence: u64,
    pub components: BTreeMap<String, ComponentEntry>,
}

impl ScopeWinner {
    pub fn from_document(scope_key: ScopeKey, document: &DeploymentDocument) -> Self {
        let components = document
            .components()
            .iter()
            .map(|(name, version)| {
                (
                    name.clone(),
                    ComponentEntry {
                        version: version.clone(),
                        group_name: document.target_group().to_string(),
                        configuration_id: document.id().to_string(),
                    },
                )
            })
            .collect();

        Self {
            scope_key,
            deployment_id: document.id().to_string(),
            target_group: document.target_group().to_string(),
            creation_timestamp: document.creation_timestamp(),
            accepted_sequence: 0,
            components,
        }
    }

    pub fn component_specification(&self) -> ComponentSpecification {
        self.components
            .iter()
            .map(|(name, entry)| (name.clone(), entry.version.clone()))
            .collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    winners: BTreeMap<ScopeKey, Arc<ScopeWinner>>,
    next_sequence: u64,
}

impl StoreState {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            winners: snapshot
                .scopes
                .into_iter()
                .map(|(key, winner)| (key, Arc::new(winner)))
                .collect(),
            next_sequence: snapshot.next_sequence,
        }
    }

    fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            next_sequence: self.next_sequence,
            scopes: self
                .winners
                .iter()
                .map(|(key, winner)| (key.clone(), winner.as_ref().clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct EffectiveConfigurationStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl EffectiveConfigurationStore {
    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store backed by a snapshot file, loading existing state if present.
    pub fn open(snapshot_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let snapshot_path = snapshot_path.into();
        let state = match snapshot::load(&snapshot_path)? {
            Some(snapshot) => {
                info!(
                    path = %snapshot_path.display(),
                    scopes = snapshot.scopes.len(),
                    "Loaded effective configuration snapshot"
                );
                StoreState::from_snapshot(snapshot)
            }
            None => StoreState::default(),
        };
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(snapshot_path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn get_winner(&self, scope: &ScopeKey) -> Option<Arc<ScopeWinner>> {
        self.read_state().winners.get(scope).cloned()
    }

    /// Atomically replace the winner for `scope`.
    ///
    /// The stored creation timestamp only ever increases: a winner whose
    /// timestamp does not exceed the current one is refused.
    pub fn replace_winner(
        &self,
        scope: &ScopeKey,
        mut winner: ScopeWinner,
    ) -> anyhow::Result<Arc<ScopeWinner>> {
        let mut state = self.write_state();

        if let Some(current) = state.winners.get(scope)
            && winner.creation_timestamp <= current.creation_timestamp
        {
            anyhow::bail!(
                "Refusing to replace winner for scope '{}': timestamp {} does not exceed {}",
                scope,
                winner.creation_timestamp,
                current.creation_timestamp
            );
        }

        winner.scope_key = scope.clone();
        winner.accepted_sequence = state.next_sequence;
        let winner = Arc::new(winner);

        let mut next_winners = state.winners.clone();
        next_winners.insert(scope.clone(), Arc::clone(&winner));
        let next = StoreState {
            winners: next_winners,
            next_sequence: state.next_sequence + 1,
        };
        self.persist(&next)?;
        *state = next;

        debug!(
            scope = %scope,
            deployment_id = %winner.deployment_id,
            creation_timestamp = winner.creation_timestamp,
            components = winner.components.len(),
            "Replaced scope winner"
        );
        Ok(winner)
    }

    /// Drop winners for scopes `keep` rejects. Returns the removed keys.
    pub fn retain_scopes<F>(&self, keep: F) -> anyhow::Result<Vec<ScopeKey>>
    where
        F: Fn(&ScopeKey) -> bool,
    {
        let mut state = self.write_state();
        let removed: Vec<ScopeKey> = state
            .winners
            .keys()
            .filter(|key| !keep(key))
            .cloned()
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        let next = StoreState {
            winners: state
                .winners
                .iter()
                .filter(|(key, _)| !removed.contains(key))
                .map(|(key, winner)| (key.clone(), Arc::clone(winner)))
                .collect(),
            next_sequence: state.next_sequence,
        };
        self.persist(&next)?;
        *state = next;

        for key in &removed {
            info!(scope = %key, "Removed winner for departed group");
        }
        Ok(removed)
    }

    pub fn list_scopes(&self) -> BTreeSet<ScopeKey> {
        self.read_state().winners.keys().cloned().collect()
    }

    /// All winners, oldest acceptance first.
    pub fn winners(&self) -> Vec<Arc<ScopeWinner>> {
        let mut winners: Vec<Arc<ScopeWinner>> =
            self.read_state().winners.values().cloned().collect();
        winners.sort_by_key(|winner| winner.accepted_sequence);
        winners
    }

    /// Component name -> scopes whose winner lists it as a root component.
    pub fn components_to_groups(&self) -> BTreeMap<String, BTreeSet<ScopeKey>> {
        let state = self.read_state();
        let mut mapping: BTreeMap<String, BTreeSet<ScopeKey>> = BTreeMap::new();
        for (scope, winner) in &state.winners {
            for name in winner.components.keys() {
                mapping
                    .entry(name.clone())
                    .or_default()
                    .insert(scope.clone());
            }
        }
        mapping
    }

    pub fn is_component_root(&self, component: &str) -> bool {
        self.read_state()
            .winners
            .values()
            .any(|winner| winner.components.contains_key(component))
    }

    fn persist(&self, state: &StoreState) -> anyhow::Result<()> {
        match &self.snapshot_path {
            Some(path) => snapshot::save(path, &state.to_snapshot()),
            None => Ok(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winner(id: &str, ts: i64, components: &[(&str, &str)]) -> ScopeWinner {
        let mut builder = DeploymentDocument::builder(id, "thinggroup/root").creation_timestamp(ts);
        for (name, version) in components {
            builder = builder.component(*name, *version);
        }
        ScopeWinner::from_document(ScopeKey::new("thinggroup/root"), &builder.build().unwrap())
    }

    #[test]
    fn replace_assigns_increasing_sequence() {
        let store = EffectiveConfigurationStore::in_memory();
        let scope = ScopeKey::new("thinggroup/root");

        let first = store
            .replace_winner(&scope, winner("d1", 100, &[("SimpleApp", "1.0.0")]))
            .unwrap();
        let second = store
            .replace_winner(&scope, winner("d2", 200, &[("SimpleApp", "2.0.0")]))
            .unwrap();

        assert!(second.accepted_sequence > first.accepted_sequence);
        assert_eq!(store.get_winner(&scope).unwrap().deployment_id, "d2");
    }

    #[test]
    fn replace_refuses_non_increasing_timestamp() {
        let store = EffectiveConfigurationStore::in_memory();
        let scope = ScopeKey::new("thinggroup/root");
        store
            .replace_winner(&scope, winner("d1", 500, &[("SimpleApp", "3.0.0")]))
            .unwrap();

        assert!(store.replace_winner(&scope, winner("d0", 500, &[])).is_err());
        assert!(store.replace_winner(&scope, winner("d0", 350, &[])).is_err());
        assert_eq!(store.get_winner(&scope).unwrap().creation_timestamp, 500);
    }

    #[test]
    fn components_to_groups_tracks_every_scope() {
        let store = EffectiveConfigurationStore::in_memory();
        store
            .replace_winner(
                &ScopeKey::new("thinggroup/a"),
                winner("d1", 1, &[("Shared", "1.0.0"), ("OnlyA", "1.0.0")]),
            )
            .unwrap();
        store
            .replace_winner(
                &ScopeKey::new("thinggroup/b"),
                winner("d2", 1, &[("Shared", "1.0.0")]),
            )
            .unwrap();

        let mapping = store.components_to_groups();

        assert_eq!(mapping["Shared"].len(), 2);
        assert_eq!(mapping["OnlyA"].len(), 1);
        assert!(store.is_component_root("OnlyA"));
        assert!(!store.is_component_root("Missing"));
    }
}
