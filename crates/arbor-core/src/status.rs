//! Deployment status reporting.
//!
//! Terminal lifecycle records (and the in-progress notice sent when a
//! deployment starts applying) become [`DeploymentStatus`] entries. Entries
//! are queued per [`DeploymentType`] in the order they were produced and
//! delivered to every consumer registered for that type:
//! - an entry leaves the queue once all consumers accepted it
//! - the first refusal stops delivery so later entries never overtake it
//! - [`StatusReporter::publish_pending`] retries, e.g. after a reconnect

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deploy::lifecycle::{DeploymentState, LifecycleRecord};
use crate::types::{DeploymentType, ScopeKey};

// =============================================================================
// Data Structures
// =============================================================================

/// Status values understood by the fleet job service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Rejected,
}

impl JobStatus {
    pub fn from_state(state: DeploymentState) -> Self {
        match state {
            DeploymentState::Queued => JobStatus::Queued,
            DeploymentState::Validating
            | DeploymentState::Arbitrating
            | DeploymentState::Applying => JobStatus::InProgress,
            DeploymentState::Succeeded => JobStatus::Succeeded,
            DeploymentState::Rejected => JobStatus::Rejected,
            DeploymentState::Failed => JobStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Rejected => "REJECTED",
        }
    }
}

/// Failure details carried verbatim on both status channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<String>,
}

/// A status entry awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub deployment_type: DeploymentType,
    pub scope: Option<ScopeKey>,
    pub target_group: Option<String>,
    pub status: JobStatus,
    pub details: StatusDetails,
    pub recorded_at: DateTime<Utc>,
}

impl DeploymentStatus {
    pub fn from_record(record: &LifecycleRecord) -> Self {
        let details = StatusDetails {
            detailed_status: record
                .detailed_status()
                .map(|status| status.as_str().to_string()),
            error_stack: record
                .error_stack()
                .iter()
                .map(|code| code.as_str().to_string())
                .collect(),
            error_types: record
                .error_types()
                .iter()
                .map(|error_type| error_type.as_str().to_string())
                .collect(),
            failure_cause: record.failure_cause().map(str::to_string),
        };
        Self {
            deployment_id: record.deployment_id.clone(),
            deployment_type: record.deployment_type,
            scope: record.scope.clone(),
            target_group: record.target_group.clone(),
            status: JobStatus::from_state(record.state()),
            details,
            recorded_at: Utc::now(),
        }
    }
}

/// Job-style status update, keyed by the deployment's target identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub deployment_id: String,
    pub target_group: Option<String>,
    pub scope: Option<ScopeKey>,
    pub status: JobStatus,
    pub status_details: StatusDetails,
}

impl From<&DeploymentStatus> for JobStatusUpdate {
    fn from(status: &DeploymentStatus) -> Self {
        Self {
            deployment_id: status.deployment_id.clone(),
            target_group: status.target_group.clone(),
            scope: status.scope.clone(),
            status: status.status,
            status_details: status.details.clone(),
        }
    }
}

/// What caused a fleet health snapshot to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    ThingGroupDeployment,
    ThingDeployment,
    LocalDeployment,
}

impl Trigger {
    pub fn from_deployment_type(deployment_type: DeploymentType) -> Self {
        match deployment_type {
            DeploymentType::Jobs => Trigger::ThingGroupDeployment,
            DeploymentType::Shadow => Trigger::ThingDeployment,
            DeploymentType::Local => Trigger::LocalDeployment,
        }
    }
}

/// Fleet health snapshot for a finished deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatusSnapshot {
    /// Scope identity of the deployment.
    pub deployment_id: String,
    pub trigger: Trigger,
    pub status: JobStatus,
    pub status_details: StatusDetails,
    pub timestamp: i64,
}

impl From<&DeploymentStatus> for FleetStatusSnapshot {
    fn from(status: &DeploymentStatus) -> Self {
        let deployment_id = status
            .scope
            .as_ref()
            .map(|scope| scope.to_string())
            .or_else(|| status.target_group.clone())
            .unwrap_or_else(|| status.deployment_id.clone());
        Self {
            deployment_id,
            trigger: Trigger::from_deployment_type(status.deployment_type),
            status: status.status,
            status_details: status.details.clone(),
            timestamp: status.recorded_at.timestamp_millis(),
        }
    }
}

// =============================================================================
// Consumers
// =============================================================================

/// Receives status entries. Returns `false` when delivery must be retried.
///
/// Consumers run one delivery at a time and must not call
/// [`StatusReporter::publish_pending`] themselves.
pub trait DeploymentStatusConsumer: Send + Sync {
    fn consume(&self, status: &DeploymentStatus) -> bool;
}

impl<F> DeploymentStatusConsumer for F
where
    F: Fn(&DeploymentStatus) -> bool + Send + Sync,
{
    fn consume(&self, status: &DeploymentStatus) -> bool {
        self(status)
    }
}

/// Outgoing half of the transport channel.
pub trait StatusTransport: Send + Sync {
    fn publish_job_update(&self, update: &JobStatusUpdate) -> bool;
    fn publish_fleet_snapshot(&self, snapshot: &FleetStatusSnapshot) -> bool;
}

/// Publishes job-style updates for every entry.
pub struct JobStatusPublisher {
    transport: Arc<dyn StatusTransport>,
}

impl JobStatusPublisher {
    pub fn new(transport: Arc<dyn StatusTransport>) -> Self {
        Self { transport }
    }
}

impl DeploymentStatusConsumer for JobStatusPublisher {
    fn consume(&self, status: &DeploymentStatus) -> bool {
        self.transport
            .publish_job_update(&JobStatusUpdate::from(status))
    }
}

/// Publishes fleet health snapshots for finished deployments.
pub struct FleetStatusPublisher {
    transport: Arc<dyn StatusTransport>,
}

impl FleetStatusPublisher {
    pub fn new(transport: Arc<dyn StatusTransport>) -> Self {
        Self { transport }
    }
}

impl DeploymentStatusConsumer for FleetStatusPublisher {
    fn consume(&self, status: &DeploymentStatus) -> bool {
        // fleet health only reflects finished deployments
        if !matches!(
            status.status,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Rejected
        ) {
            return true;
        }
        self.transport
            .publish_fleet_snapshot(&FleetStatusSnapshot::from(status))
    }
}

/// Transport that keeps everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    job_updates: Mutex<Vec<JobStatusUpdate>>,
    fleet_snapshots: Mutex<Vec<FleetStatusSnapshot>>,
    offline: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every publish is refused.
    pub fn set_offline(&self, offline: bool) {
        *self
            .offline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = offline;
    }

    pub fn job_updates(&self) -> Vec<JobStatusUpdate> {
        self.job_updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn fleet_snapshots(&self) -> Vec<FleetStatusSnapshot> {
        self.fleet_snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_offline(&self) -> bool {
        *self
            .offline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusTransport for RecordingTransport {
    fn publish_job_update(&self, update: &JobStatusUpdate) -> bool {
        if self.is_offline() {
            return false;
        }
        self.job_updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(update.clone());
        true
    }

    fn publish_fleet_snapshot(&self, snapshot: &FleetStatusSnapshot) -> bool {
        if self.is_offline() {
            return false;
        }
        self.fleet_snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot.clone());
        true
    }
}

// =============================================================================
// Reporter
// =============================================================================

type ConsumerList = Vec<(String, Arc<dyn DeploymentStatusConsumer>)>;

#[derive(Default)]
pub struct StatusReporter {
    consumers: RwLock<BTreeMap<DeploymentType, ConsumerList>>,
    pending: Mutex<BTreeMap<DeploymentType, VecDeque<DeploymentStatus>>>,
    // serializes consumer calls; `pending` is only held to push or pop
    delivery: Mutex<()>,
}

impl std::fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `consumer` under `name` for one deployment type.
    ///
    /// Returns `false` if the name is already taken for that type.
    pub fn register(
        &self,
        deployment_type: DeploymentType,
        name: impl Into<String>,
        consumer: Arc<dyn DeploymentStatusConsumer>,
    ) -> bool {
        let name = name.into();
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let list = consumers.entry(deployment_type).or_default();
        if list.iter().any(|(existing, _)| existing == &name) {
            return false;
        }
        list.push((name, consumer));
        true
    }

    /// Register job and fleet publishers for every deployment type.
    pub fn register_transport(&self, transport: Arc<dyn StatusTransport>) {
        let jobs: Arc<dyn DeploymentStatusConsumer> =
            Arc::new(JobStatusPublisher::new(Arc::clone(&transport)));
        let fleet: Arc<dyn DeploymentStatusConsumer> =
            Arc::new(FleetStatusPublisher::new(transport));
        for deployment_type in DeploymentType::ALL {
            self.register(deployment_type, "job-status", Arc::clone(&jobs));
            self.register(deployment_type, "fleet-status", Arc::clone(&fleet));
        }
    }

    /// Queue an entry behind any undelivered ones of the same type.
    pub fn enqueue(&self, status: DeploymentStatus) {
        debug!(
            deployment_id = %status.deployment_id,
            status = status.status.as_str(),
            "Storing deployment status"
        );
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(status.deployment_type)
            .or_default()
            .push_back(status);
    }

    /// Queue and immediately try to deliver.
    pub fn report(&self, status: DeploymentStatus) -> usize {
        let deployment_type = status.deployment_type;
        self.enqueue(status);
        self.publish_pending(deployment_type)
    }

    /// Deliver queued entries of one type in order. Returns how many left the queue.
    pub fn publish_pending(&self, deployment_type: DeploymentType) -> usize {
        let consumers: ConsumerList = self
            .consumers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&deployment_type)
            .cloned()
            .unwrap_or_default();

        let _delivery = self
            .delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // only this loop pops, so the front stays put while consumers run
        let mut delivered = 0;
        while let Some(front) = self.front(deployment_type) {
            let all_accepted = consumers.iter().all(|(_, consumer)| consumer.consume(&front));
            if !all_accepted {
                warn!(
                    deployment_type = %deployment_type,
                    deployment_id = %front.deployment_id,
                    remaining = self.queued(deployment_type),
                    "Unable to deliver deployment status; will retry later"
                );
                break;
            }
            self.pop_front(deployment_type);
            delivered += 1;
        }
        delivered
    }

    fn front(&self, deployment_type: DeploymentType) -> Option<DeploymentStatus> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&deployment_type)
            .and_then(|queue| queue.front().cloned())
    }

    fn pop_front(&self, deployment_type: DeploymentType) {
        if let Some(queue) = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(&deployment_type)
        {
            queue.pop_front();
        }
    }

    fn queued(&self, deployment_type: DeploymentType) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&deployment_type)
            .map_or(0, VecDeque::len)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(VecDeque::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeploymentError;

    fn rejected_record(id: &str) -> LifecycleRecord {
        let mut record = LifecycleRecord::queued(id, DeploymentType::Jobs);
        record.scope = Some(ScopeKey::new("thinggroup/root"));
        record.target_group = Some("thinggroup/sub1".to_string());
        record.transition(DeploymentState::Validating).unwrap();
        record.transition(DeploymentState::Arbitrating).unwrap();
        record
            .fail_with(&DeploymentError::StaleDeployment {
                scope: ScopeKey::new("thinggroup/root"),
                candidate: 350,
                winner: 500,
            })
            .unwrap();
        record
    }

    #[test]
    fn status_mapping_collapses_working_states() {
        assert_eq!(JobStatus::from_state(DeploymentState::Queued), JobStatus::Queued);
        assert_eq!(
            JobStatus::from_state(DeploymentState::Arbitrating),
            JobStatus::InProgress
        );
        assert_eq!(
            JobStatus::from_state(DeploymentState::Rejected),
            JobStatus::Rejected
        );
    }

    #[test]
    fn both_channels_carry_error_stack_verbatim() {
        let transport = Arc::new(RecordingTransport::new());
        let reporter = StatusReporter::new();
        reporter.register_transport(transport.clone());

        reporter.report(DeploymentStatus::from_record(&rejected_record("d-350")));

        let job = &transport.job_updates()[0];
        assert_eq!(job.status, JobStatus::Rejected);
        assert_eq!(
            job.status_details.error_stack,
            vec!["DEPLOYMENT_REJECTED", "REJECTED_STALE_DEPLOYMENT"]
        );
        let fleet = &transport.fleet_snapshots()[0];
        assert_eq!(fleet.deployment_id, "thinggroup/root");
        assert_eq!(fleet.trigger, Trigger::ThingGroupDeployment);
        assert_eq!(
            fleet.status_details.detailed_status.as_deref(),
            Some("STALE_DEPLOYMENT")
        );
    }

    #[test]
    fn refused_delivery_keeps_order_until_retry() {
        let transport = Arc::new(RecordingTransport::new());
        let reporter = StatusReporter::new();
        reporter.register_transport(transport.clone());

        transport.set_offline(true);
        assert_eq!(reporter.report(DeploymentStatus::from_record(&rejected_record("first"))), 0);
        assert_eq!(reporter.report(DeploymentStatus::from_record(&rejected_record("second"))), 0);
        assert_eq!(reporter.pending_count(), 2);

        transport.set_offline(false);
        assert_eq!(reporter.publish_pending(DeploymentType::Jobs), 2);

        let ids: Vec<String> = transport
            .job_updates()
            .into_iter()
            .map(|update| update.deployment_id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(reporter.pending_count(), 0);
    }

    #[test]
    fn consumers_can_enqueue_while_delivering() {
        let reporter = Arc::new(StatusReporter::new());
        let inner = Arc::clone(&reporter);
        let consumer: Arc<dyn DeploymentStatusConsumer> =
            Arc::new(move |status: &DeploymentStatus| {
                if status.deployment_id == "first" {
                    inner.enqueue(DeploymentStatus::from_record(&rejected_record("second")));
                }
                true
            });
        reporter.register(DeploymentType::Jobs, "echo", consumer);

        let delivered = reporter.report(DeploymentStatus::from_record(&rejected_record("first")));

        assert_eq!(delivered, 2);
        assert_eq!(reporter.pending_count(), 0);
    }

    #[test]
    fn duplicate_consumer_name_is_refused() {
        let reporter = StatusReporter::new();
        let consumer: Arc<dyn DeploymentStatusConsumer> = Arc::new(|_: &DeploymentStatus| true);

        assert!(reporter.register(DeploymentType::Local, "cli", Arc::clone(&consumer)));
        assert!(!reporter.register(DeploymentType::Local, "cli", consumer));
    }
}
