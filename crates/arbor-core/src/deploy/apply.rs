//! Hand-off of the effective component set to the service lifecycle manager.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::effective::EffectiveComponentSet;
use crate::error::ApplyFailure;
use crate::types::ScopeKey;

/// What the lifecycle manager is asked to realize for one accepted deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyPlan {
    pub deployment_id: String,
    pub scope: ScopeKey,
    pub components: EffectiveComponentSet,
    pub fingerprint: String,
}

impl ApplyPlan {
    pub fn new(
        deployment_id: impl Into<String>,
        scope: ScopeKey,
        components: EffectiveComponentSet,
    ) -> Self {
        let fingerprint = components.fingerprint();
        Self {
            deployment_id: deployment_id.into(),
            scope,
            components,
            fingerprint,
        }
    }
}

/// Diffs the plan against running components and installs/starts/stops/removes.
///
/// Reports exactly once per plan. Timeouts and retries are the manager's own
/// business.
#[async_trait]
pub trait ServiceLifecycleManager: Send + Sync {
    async fn apply(&self, plan: &ApplyPlan) -> Result<(), ApplyFailure>;
}

/// Lifecycle manager that records plans instead of running anything.
///
/// Components named in `failing` make any plan containing them fail.
#[derive(Debug, Default)]
pub struct RecordingLifecycleManager {
    applied: Mutex<Vec<ApplyPlan>>,
    failing: Mutex<BTreeSet<String>>,
}

impl RecordingLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_component(&self, component: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(component.into());
    }

    pub fn clear_failures(&self) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn applied(&self) -> Vec<ApplyPlan> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_applied(&self) -> Option<ApplyPlan> {
        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl ServiceLifecycleManager for RecordingLifecycleManager {
    async fn apply(&self, plan: &ApplyPlan) -> Result<(), ApplyFailure> {
        let broken = {
            let failing = self
                .failing
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            plan.components
                .versions()
                .keys()
                .find(|name| failing.contains(*name))
                .cloned()
        };

        self.applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(plan.clone());

        match broken {
            Some(component) => Err(ApplyFailure::for_component(
                component.clone(),
                format!("component '{}' failed to start", component),
            )),
            None => Ok(()),
        }
    }
}
