//! Deployment queue with a single processing worker.
//!
//! Producers enqueue from any task without blocking. One worker dequeues and
//! runs each deployment through the pipeline before taking the next, so the
//! arbiter's read-then-replace on the store never races.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::lifecycle::LifecycleRecord;
use super::pipeline::{DeploymentPipeline, QueuedDeployment};
use crate::document::DeploymentDocument;
use crate::types::DeploymentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngressError {
    #[error("Deployment queue is closed")]
    Closed,
    #[error("Deployment was dropped before reaching a terminal state")]
    Dropped,
}

struct IngressMessage {
    queued: QueuedDeployment,
    completion: oneshot::Sender<LifecycleRecord>,
}

/// Resolves with the deployment's terminal lifecycle record.
#[derive(Debug)]
pub struct CompletionHandle {
    deployment_id: String,
    receiver: oneshot::Receiver<LifecycleRecord>,
}

impl CompletionHandle {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub async fn wait(self) -> Result<LifecycleRecord, IngressError> {
        self.receiver.await.map_err(|_| IngressError::Dropped)
    }
}

/// Cloneable producer side of the queue.
#[derive(Debug, Clone)]
pub struct IngressSender {
    sender: mpsc::UnboundedSender<IngressMessage>,
}

impl std::fmt::Debug for IngressMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressMessage")
            .field("deployment_type", &self.queued.deployment_type)
            .finish_non_exhaustive()
    }
}

impl IngressSender {
    pub fn enqueue(
        &self,
        deployment_type: DeploymentType,
        document: DeploymentDocument,
    ) -> Result<CompletionHandle, IngressError> {
        self.submit(QueuedDeployment::parsed(deployment_type, document))
    }

    /// Enqueue unparsed JSON. Parse failures come back as a rejected record.
    pub fn enqueue_raw(
        &self,
        deployment_type: DeploymentType,
        content: impl Into<String>,
    ) -> Result<CompletionHandle, IngressError> {
        self.submit(QueuedDeployment::raw(deployment_type, content))
    }

    pub fn submit(&self, queued: QueuedDeployment) -> Result<CompletionHandle, IngressError> {
        let deployment_id = queued.deployment_id();
        let (completion, receiver) = oneshot::channel();
        self.sender
            .send(IngressMessage { queued, completion })
            .map_err(|_| IngressError::Closed)?;
        debug!(deployment_id = %deployment_id, "Deployment enqueued");
        Ok(CompletionHandle {
            deployment_id,
            receiver,
        })
    }
}

#[derive(Debug)]
pub struct DeploymentIngress {
    sender: IngressSender,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl DeploymentIngress {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(pipeline: Arc<DeploymentPipeline>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(pipeline, receiver, shutdown_rx));
        Self {
            sender: IngressSender { sender },
            shutdown,
            worker,
        }
    }

    pub fn sender(&self) -> IngressSender {
        self.sender.clone()
    }

    pub fn enqueue(
        &self,
        deployment_type: DeploymentType,
        document: DeploymentDocument,
    ) -> Result<CompletionHandle, IngressError> {
        self.sender.enqueue(deployment_type, document)
    }

    pub fn enqueue_raw(
        &self,
        deployment_type: DeploymentType,
        content: impl Into<String>,
    ) -> Result<CompletionHandle, IngressError> {
        self.sender.enqueue_raw(deployment_type, content)
    }

    /// Stop after the deployment in flight. Queued ones resolve to `Dropped`.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.worker.await {
            error!(error = %e, "Deployment worker ended abnormally");
        }
    }
}

async fn run_worker(
    pipeline: Arc<DeploymentPipeline>,
    mut receiver: mpsc::UnboundedReceiver<IngressMessage>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            message = receiver.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let IngressMessage { queued, completion } = message;
        match pipeline.process(queued).await {
            Ok(record) => {
                // the producer may have stopped waiting
                let _ = completion.send(record);
            }
            Err(e) => error!(error = %e, "Deployment pipeline violated its lifecycle"),
        }
    }
    receiver.close();
    debug!("Deployment worker stopped");
}
