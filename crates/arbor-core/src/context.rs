//! Agent context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::capability::CapabilityGate;
use crate::config::AgentConfig;
use crate::deploy::{DeploymentPipeline, ServiceLifecycleManager};
use crate::effective::{EffectiveConfigurationStore, SNAPSHOT_FILE_NAME};
use crate::membership::StaticMembership;
use crate::status::StatusReporter;

/// Shared services built once from an [`AgentConfig`].
///
/// Frontends create this once and hand it to [`crate::agent::Agent::start`].
/// Everything inside is reference counted, so clones share the same store,
/// membership and reporter.
#[derive(Debug, Clone)]
pub struct AgentContext {
    config: AgentConfig,
    state_dir: Option<PathBuf>,
    store: Arc<EffectiveConfigurationStore>,
    membership: Arc<StaticMembership>,
    reporter: Arc<StatusReporter>,
}

impl AgentContext {
    /// Open the persisted store under the configured state directory.
    pub fn from_config(config: AgentConfig) -> anyhow::Result<Self> {
        let state_dir = config.resolved_state_dir()?;
        std::fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;
        let store = EffectiveConfigurationStore::open(state_dir.join(SNAPSHOT_FILE_NAME))?;

        Ok(Self::assemble(config, Some(state_dir), store))
    }

    /// Context whose store is never written to disk.
    pub fn in_memory(config: AgentConfig) -> Self {
        Self::assemble(config, None, EffectiveConfigurationStore::in_memory())
    }

    fn assemble(
        config: AgentConfig,
        state_dir: Option<PathBuf>,
        store: EffectiveConfigurationStore,
    ) -> Self {
        let membership = Arc::new(StaticMembership::new(config.memberships.iter().cloned()));
        Self {
            config,
            state_dir,
            store: Arc::new(store),
            membership,
            reporter: Arc::new(StatusReporter::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    pub fn store(&self) -> &Arc<EffectiveConfigurationStore> {
        &self.store
    }

    /// Membership set; discovery updates it through [`StaticMembership::set`].
    pub fn membership(&self) -> &Arc<StaticMembership> {
        &self.membership
    }

    pub fn reporter(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    pub fn capability_gate(&self) -> CapabilityGate {
        CapabilityGate::new(self.config.supported_capabilities.iter().cloned())
    }

    /// Build the processing pipeline around `lifecycle_manager`.
    pub fn pipeline(&self, lifecycle_manager: Arc<dyn ServiceLifecycleManager>) -> DeploymentPipeline {
        DeploymentPipeline::new(
            self.capability_gate(),
            Arc::clone(&self.store),
            self.membership.clone(),
            lifecycle_manager,
            Arc::clone(&self.reporter),
        )
        .with_pruning(self.config.prune_departed_groups)
    }
}
