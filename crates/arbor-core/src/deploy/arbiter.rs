//! Arbitration of deployments that share a fleet hierarchy.
//!
//! A candidate is accepted only when its creation timestamp is strictly
//! greater than the recorded winner for its scope. Arrival order and target
//! depth play no part: a sub-group deployment competes with the root's and
//! its siblings' deployments for the same scope record. A candidate whose
//! timestamp equals the winner's (re-delivery of the winner itself, or a
//! different document minted at the same instant) is rejected as stale, and
//! `revision` is never consulted.

use std::sync::Arc;

use tracing::info;

use crate::document::DeploymentDocument;
use crate::effective::{EffectiveConfigurationStore, ScopeWinner};
use crate::error::DeploymentError;
use crate::types::ScopeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbitrationDecision {
    Accept {
        /// Timestamp of the winner being superseded, if any.
        superseded: Option<i64>,
    },
    Reject(DeploymentError),
}

impl ArbitrationDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, ArbitrationDecision::Accept { .. })
    }
}

/// The ordering rule, free of any store access.
pub fn decide(
    scope: &ScopeKey,
    candidate_timestamp: i64,
    current: Option<&ScopeWinner>,
) -> ArbitrationDecision {
    match current {
        None => ArbitrationDecision::Accept { superseded: None },
        Some(winner) if candidate_timestamp > winner.creation_timestamp => {
            ArbitrationDecision::Accept {
                superseded: Some(winner.creation_timestamp),
            }
        }
        Some(winner) => ArbitrationDecision::Reject(DeploymentError::StaleDeployment {
            scope: scope.clone(),
            candidate: candidate_timestamp,
            winner: winner.creation_timestamp,
        }),
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentArbiter {
    store: Arc<EffectiveConfigurationStore>,
}

impl DeploymentArbiter {
    pub fn new(store: Arc<EffectiveConfigurationStore>) -> Self {
        Self { store }
    }

    /// Compare `document` against the scope's current winner.
    pub fn arbitrate(&self, scope: &ScopeKey, document: &DeploymentDocument) -> ArbitrationDecision {
        let current = self.store.get_winner(scope);
        let decision = decide(scope, document.creation_timestamp(), current.as_deref());

        match &decision {
            ArbitrationDecision::Accept { superseded } => info!(
                deployment_id = %document.id(),
                scope = %scope,
                creation_timestamp = document.creation_timestamp(),
                superseded = ?superseded,
                "Deployment accepted"
            ),
            ArbitrationDecision::Reject(err) => info!(
                deployment_id = %document.id(),
                scope = %scope,
                creation_timestamp = document.creation_timestamp(),
                reason = %err,
                "Deployment rejected"
            ),
        }
        decision
    }

    /// Record an accepted document as the scope's new winner.
    pub fn commit(
        &self,
        scope: &ScopeKey,
        document: &DeploymentDocument,
    ) -> Result<Arc<ScopeWinner>, DeploymentError> {
        let winner = ScopeWinner::from_document(scope.clone(), document);
        self.store
            .replace_winner(scope, winner)
            .map_err(|e| DeploymentError::Persistence {
                reason: format!("{e:#}"),
            })
    }
}
