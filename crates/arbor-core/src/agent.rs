//! Running agent: context plus the ingress worker.

use std::sync::Arc;

use tracing::info;

use crate::context::AgentContext;
use crate::deploy::{
    CompletionHandle, DeploymentIngress, IngressError, IngressSender, ServiceLifecycleManager,
};
use crate::document::DeploymentDocument;
use crate::effective::EffectiveComponentSet;
use crate::status::StatusTransport;
use crate::types::DeploymentType;

#[derive(Debug)]
pub struct Agent {
    context: AgentContext,
    ingress: DeploymentIngress,
}

impl Agent {
    /// Start the deployment worker. Must be called inside a tokio runtime.
    pub fn start(context: AgentContext, lifecycle_manager: Arc<dyn ServiceLifecycleManager>) -> Self {
        let pipeline = Arc::new(context.pipeline(lifecycle_manager));
        let ingress = DeploymentIngress::start(pipeline);
        info!(
            scopes = context.store().list_scopes().len(),
            prune_departed_groups = context.config().prune_departed_groups,
            "Deployment agent started"
        );
        Self { context, ingress }
    }

    /// Register job and fleet publishers on `transport` for every type.
    pub fn attach_transport(&self, transport: Arc<dyn StatusTransport>) {
        self.context.reporter().register_transport(transport);
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn sender(&self) -> IngressSender {
        self.ingress.sender()
    }

    pub fn enqueue(
        &self,
        deployment_type: DeploymentType,
        document: DeploymentDocument,
    ) -> Result<CompletionHandle, IngressError> {
        self.ingress.enqueue(deployment_type, document)
    }

    pub fn enqueue_raw(
        &self,
        deployment_type: DeploymentType,
        content: impl Into<String>,
    ) -> Result<CompletionHandle, IngressError> {
        self.ingress.enqueue_raw(deployment_type, content)
    }

    pub fn effective_components(&self) -> EffectiveComponentSet {
        crate::effective::merge_winners(&self.context.store().winners())
    }

    /// Retry undelivered statuses for every deployment type.
    pub fn flush_statuses(&self) -> usize {
        DeploymentType::ALL
            .into_iter()
            .map(|deployment_type| self.context.reporter().publish_pending(deployment_type))
            .sum()
    }

    pub async fn shutdown(self) {
        self.ingress.shutdown().await;
        info!("Deployment agent stopped");
    }
}
