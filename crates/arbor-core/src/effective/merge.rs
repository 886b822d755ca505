//! Projection of every scope winner into the device-wide component set.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::{EffectiveConfigurationStore, ScopeWinner};
use crate::types::{ComponentSpecification, ScopeKey};

/// Device-wide component name -> version, with the scope each came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveComponentSet {
    components: ComponentSpecification,
    sources: BTreeMap<String, ScopeKey>,
}

impl EffectiveComponentSet {
    pub fn versions(&self) -> &ComponentSpecification {
        &self.components
    }

    pub fn get(&self, component: &str) -> Option<&str> {
        self.components.get(component).map(String::as_str)
    }

    pub fn source(&self, component: &str) -> Option<&ScopeKey> {
        self.sources.get(component)
    }

    pub fn contains(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Content hash over the ordered name/version pairs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (name, version) in &self.components {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(version.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Merge winners into one component set.
///
/// Winners are applied in acceptance order, so when two scopes name the
/// same component the most recently accepted scope's version is kept.
pub fn merge_winners(winners: &[Arc<ScopeWinner>]) -> EffectiveComponentSet {
    let mut ordered: Vec<&Arc<ScopeWinner>> = winners.iter().collect();
    ordered.sort_by_key(|winner| winner.accepted_sequence);

    let mut merged = EffectiveComponentSet::default();
    for winner in ordered {
        for (name, entry) in &winner.components {
            if let Some(previous) = merged.sources.get(name)
                && previous != &winner.scope_key
                && merged.components.get(name) != Some(&entry.version)
            {
                warn!(
                    component = %name,
                    overridden_scope = %previous,
                    winning_scope = %winner.scope_key,
                    version = %entry.version,
                    "Component declared by multiple scopes; newest acceptance wins"
                );
            }
            merged
                .components
                .insert(name.clone(), entry.version.clone());
            merged
                .sources
                .insert(name.clone(), winner.scope_key.clone());
        }
    }
    merged
}

#[derive(Debug, Clone)]
pub struct ConfigurationMerger {
    store: Arc<EffectiveConfigurationStore>,
}

impl ConfigurationMerger {
    pub fn new(store: Arc<EffectiveConfigurationStore>) -> Self {
        Self { store }
    }

    pub fn compute_effective_component_set(&self) -> EffectiveComponentSet {
        merge_winners(&self.store.winners())
    }
}
