//! Deployment processing: scope resolution, arbitration, lifecycle and the
//! single-worker queue that ties them together.

pub mod apply;
pub mod arbiter;
pub mod ingress;
pub mod lifecycle;
pub mod pipeline;
pub mod scope;

pub use apply::{ApplyPlan, RecordingLifecycleManager, ServiceLifecycleManager};
pub use arbiter::{ArbitrationDecision, DeploymentArbiter};
pub use ingress::{CompletionHandle, DeploymentIngress, IngressError, IngressSender};
pub use lifecycle::{DeploymentState, IllegalTransition, LifecycleRecord};
pub use pipeline::{DeploymentPayload, DeploymentPipeline, QueuedDeployment};
pub use scope::{ScopeDecision, ScopeResolver, ScopeSource};
