//! One deployment from dequeue to terminal state.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::apply::{ApplyPlan, ServiceLifecycleManager};
use super::arbiter::{ArbitrationDecision, DeploymentArbiter};
use super::lifecycle::{DeploymentState, IllegalTransition, LifecycleRecord};
use super::scope::ScopeResolver;
use crate::capability::CapabilityGate;
use crate::document::{DeploymentDocument, parse_document_str};
use crate::effective::{ConfigurationMerger, EffectiveConfigurationStore};
use crate::error::DeploymentError;
use crate::membership::GroupMembershipProvider;
use crate::status::{DeploymentStatus, StatusReporter};
use crate::types::{DeploymentType, ScopeKey};

/// Placeholder id for raw payloads whose id cannot be read.
pub const UNKNOWN_DEPLOYMENT_ID: &str = "<unknown>";

/// Deployment content as it arrived.
#[derive(Debug, Clone)]
pub enum DeploymentPayload {
    Parsed(DeploymentDocument),
    /// Unparsed JSON; parse errors surface as a rejected lifecycle record.
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct QueuedDeployment {
    pub deployment_type: DeploymentType,
    pub payload: DeploymentPayload,
}

impl QueuedDeployment {
    pub fn parsed(deployment_type: DeploymentType, document: DeploymentDocument) -> Self {
        Self {
            deployment_type,
            payload: DeploymentPayload::Parsed(document),
        }
    }

    pub fn raw(deployment_type: DeploymentType, content: impl Into<String>) -> Self {
        Self {
            deployment_type,
            payload: DeploymentPayload::Raw(content.into()),
        }
    }

    /// Best-effort id, readable even from malformed payloads.
    pub fn deployment_id(&self) -> String {
        match &self.payload {
            DeploymentPayload::Parsed(document) => document.id().to_string(),
            DeploymentPayload::Raw(content) => peek_deployment_id(content)
                .unwrap_or_else(|| UNKNOWN_DEPLOYMENT_ID.to_string()),
        }
    }
}

fn peek_deployment_id(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    ["deploymentId", "id"]
        .iter()
        .find_map(|key| value.get(key).and_then(|id| id.as_str()))
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
}

/// Validation, arbitration and apply for a single deployment.
///
/// Callers must run one `process` at a time; the ingress worker guarantees it.
pub struct DeploymentPipeline {
    gate: CapabilityGate,
    resolver: ScopeResolver,
    arbiter: DeploymentArbiter,
    merger: ConfigurationMerger,
    store: Arc<EffectiveConfigurationStore>,
    membership: Arc<dyn GroupMembershipProvider>,
    lifecycle_manager: Arc<dyn ServiceLifecycleManager>,
    reporter: Arc<StatusReporter>,
    prune_departed_groups: bool,
    // membership as of the last pruning pass; departures are measured against it
    observed_membership: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for DeploymentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentPipeline")
            .field("gate", &self.gate)
            .field("store", &self.store)
            .field("prune_departed_groups", &self.prune_departed_groups)
            .finish_non_exhaustive()
    }
}

impl DeploymentPipeline {
    pub fn new(
        gate: CapabilityGate,
        store: Arc<EffectiveConfigurationStore>,
        membership: Arc<dyn GroupMembershipProvider>,
        lifecycle_manager: Arc<dyn ServiceLifecycleManager>,
        reporter: Arc<StatusReporter>,
    ) -> Self {
        let observed_membership = Mutex::new(membership.current_membership());
        Self {
            gate,
            resolver: ScopeResolver::new(Arc::clone(&membership)),
            arbiter: DeploymentArbiter::new(Arc::clone(&store)),
            merger: ConfigurationMerger::new(Arc::clone(&store)),
            store,
            membership,
            lifecycle_manager,
            reporter,
            prune_departed_groups: true,
            observed_membership,
        }
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.prune_departed_groups = enabled;
        self
    }

    pub fn store(&self) -> &Arc<EffectiveConfigurationStore> {
        &self.store
    }

    pub fn reporter(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    /// Drive one deployment to a terminal state and queue its status.
    ///
    /// An `Err` means the pipeline itself attempted an illegal transition.
    pub async fn process(
        &self,
        queued: QueuedDeployment,
    ) -> Result<LifecycleRecord, IllegalTransition> {
        let mut record = LifecycleRecord::queued(queued.deployment_id(), queued.deployment_type);
        info!(
            deployment_id = %record.deployment_id,
            deployment_type = %record.deployment_type,
            "Processing deployment"
        );

        self.run(&mut record, queued.payload).await?;

        info!(
            deployment_id = %record.deployment_id,
            state = %record.state(),
            detailed_status = ?record.detailed_status(),
            "Deployment finished"
        );
        self.publish(&record);
        Ok(record)
    }

    async fn run(
        &self,
        record: &mut LifecycleRecord,
        payload: DeploymentPayload,
    ) -> Result<(), IllegalTransition> {
        record.transition(DeploymentState::Validating)?;

        let document = match payload {
            DeploymentPayload::Parsed(document) => document,
            DeploymentPayload::Raw(content) => match parse_document_str(&content) {
                Ok(document) => document,
                Err(err) => return record.fail_with(&err),
            },
        };
        record.target_group = Some(document.target_group().to_string());
        record.creation_timestamp = Some(document.creation_timestamp());

        if let Err(err) = self.gate.check(document.required_capabilities()) {
            return record.fail_with(&err);
        }
        let scope = match self.resolver.resolve(&document) {
            Ok(decision) => {
                debug!(
                    deployment_id = %record.deployment_id,
                    scope = %decision.scope,
                    source = ?decision.source,
                    "Resolved arbitration scope"
                );
                decision.scope
            }
            Err(err) => return record.fail_with(&err),
        };
        record.scope = Some(scope.clone());

        record.transition(DeploymentState::Arbitrating)?;
        if let ArbitrationDecision::Reject(err) = self.arbiter.arbitrate(&scope, &document) {
            return record.fail_with(&err);
        }

        record.transition(DeploymentState::Applying)?;
        if record.deployment_type == DeploymentType::Jobs {
            self.publish(record);
        }

        if let Err(err) = self.arbiter.commit(&scope, &document) {
            return record.fail_with(&err);
        }
        if self.prune_departed_groups {
            self.prune_departed(&scope);
        }

        let plan = ApplyPlan::new(
            document.id(),
            scope,
            self.merger.compute_effective_component_set(),
        );
        debug!(
            deployment_id = %plan.deployment_id,
            components = plan.components.len(),
            fingerprint = %plan.fingerprint,
            "Handing effective component set to lifecycle manager"
        );
        match self.lifecycle_manager.apply(&plan).await {
            Ok(()) => record.succeed(),
            Err(failure) => record.fail_with(&DeploymentError::from(failure)),
        }
    }

    /// Forget winners of groups this device has left.
    ///
    /// Only groups that membership discovery reported earlier and no longer
    /// reports count as departed. Scopes it never reported are left alone.
    fn prune_departed(&self, accepted: &ScopeKey) {
        let current = self.membership.current_membership();
        let mut observed = self
            .observed_membership
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let departed: BTreeSet<String> = observed.difference(&current).cloned().collect();
        if departed.is_empty() {
            *observed = current;
            return;
        }

        info!(departed = ?departed, "Device left groups; dropping their winners");
        let result = self.store.retain_scopes(|scope| {
            scope == accepted
                || scope.is_membership_exempt()
                || !departed.contains(scope.as_str())
        });
        match result {
            // keep the old view on failure so the next acceptance retries
            Ok(_) => *observed = current,
            Err(e) => {
                warn!(scope = %accepted, error = %format!("{e:#}"), "Failed to prune departed groups");
            }
        }
    }

    /// Queue the record's status in order, then deliver off the worker.
    fn publish(&self, record: &LifecycleRecord) {
        let deployment_type = record.deployment_type;
        self.reporter.enqueue(DeploymentStatus::from_record(record));

        let reporter = Arc::clone(&self.reporter);
        tokio::task::spawn_blocking(move || reporter.publish_pending(deployment_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::apply::RecordingLifecycleManager;
    use crate::membership::StaticMembership;

    fn pipeline(groups: &[&str]) -> (DeploymentPipeline, Arc<RecordingLifecycleManager>) {
        let manager = Arc::new(RecordingLifecycleManager::new());
        let pipeline = DeploymentPipeline::new(
            CapabilityGate::default(),
            Arc::new(EffectiveConfigurationStore::in_memory()),
            Arc::new(StaticMembership::new(groups.iter().copied())),
            manager.clone(),
            Arc::new(StatusReporter::new()),
        );
        (pipeline, manager)
    }

    #[test]
    fn raw_payload_id_is_peeked() {
        let queued = QueuedDeployment::raw(DeploymentType::Local, r#"{"deploymentId": "d-7", "#);
        assert_eq!(queued.deployment_id(), UNKNOWN_DEPLOYMENT_ID);

        let queued = QueuedDeployment::raw(DeploymentType::Local, r#"{"deploymentId": "d-7"}"#);
        assert_eq!(queued.deployment_id(), "d-7");
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (pipeline, manager) = pipeline(&[]);

        let record = pipeline
            .process(QueuedDeployment::raw(DeploymentType::Local, "{ not json"))
            .await
            .unwrap();

        assert_eq!(record.state(), DeploymentState::Rejected);
        assert!(record.scope.is_none());
        assert!(manager.applied().is_empty());
    }

    #[tokio::test]
    async fn accepted_deployment_is_applied() {
        let (pipeline, manager) = pipeline(&["thinggroup/root"]);
        let document = DeploymentDocument::builder("d1", "thinggroup/root")
            .creation_timestamp(100)
            .component("A", "1.0.0")
            .build()
            .unwrap();

        let record = pipeline
            .process(QueuedDeployment::parsed(DeploymentType::Jobs, document))
            .await
            .unwrap();

        assert_eq!(record.state(), DeploymentState::Succeeded);
        let plan = manager.last_applied().unwrap();
        assert_eq!(plan.components.get("A"), Some("1.0.0"));
    }

    #[tokio::test]
    async fn apply_failure_keeps_the_winner() {
        let (pipeline, manager) = pipeline(&["thinggroup/root"]);
        manager.fail_component("A");
        let document = DeploymentDocument::builder("d1", "thinggroup/root")
            .creation_timestamp(100)
            .component("A", "1.0.0")
            .build()
            .unwrap();

        let record = pipeline
            .process(QueuedDeployment::parsed(DeploymentType::Jobs, document))
            .await
            .unwrap();

        assert_eq!(record.state(), DeploymentState::Failed);
        let winner = pipeline
            .store()
            .get_winner(&ScopeKey::new("thinggroup/root"))
            .unwrap();
        assert_eq!(winner.deployment_id, "d1");
    }
}
