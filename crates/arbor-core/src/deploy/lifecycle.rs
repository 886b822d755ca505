//! Per-deployment lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{DeploymentError, DeploymentErrorCode, DeploymentErrorType, DetailedStatus};
use crate::types::{DeploymentType, ScopeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Queued,
    Validating,
    Arbitrating,
    Applying,
    Succeeded,
    Rejected,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Succeeded | DeploymentState::Rejected | DeploymentState::Failed
        )
    }

    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        matches!(
            (self, next),
            (Queued, Validating)
                | (Validating, Rejected)
                | (Validating, Arbitrating)
                | (Arbitrating, Rejected)
                | (Arbitrating, Applying)
                | (Applying, Succeeded)
                | (Applying, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Queued => "QUEUED",
            DeploymentState::Validating => "VALIDATING",
            DeploymentState::Arbitrating => "ARBITRATING",
            DeploymentState::Applying => "APPLYING",
            DeploymentState::Succeeded => "SUCCEEDED",
            DeploymentState::Rejected => "REJECTED",
            DeploymentState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal lifecycle transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: DeploymentState,
    pub to: DeploymentState,
}

/// State and outcome of one processed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub deployment_id: String,
    pub deployment_type: DeploymentType,
    pub target_group: Option<String>,
    pub scope: Option<ScopeKey>,
    pub creation_timestamp: Option<i64>,
    state: DeploymentState,
    detailed_status: Option<DetailedStatus>,
    error_stack: Vec<DeploymentErrorCode>,
    error_types: Vec<DeploymentErrorType>,
    /// Human-readable reason of the terminal error.
    failure_cause: Option<String>,
    history: Vec<(DeploymentState, DateTime<Utc>)>,
}

impl LifecycleRecord {
    pub fn queued(deployment_id: impl Into<String>, deployment_type: DeploymentType) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            deployment_type,
            target_group: None,
            scope: None,
            creation_timestamp: None,
            state: DeploymentState::Queued,
            detailed_status: None,
            error_stack: Vec::new(),
            error_types: Vec::new(),
            failure_cause: None,
            history: vec![(DeploymentState::Queued, Utc::now())],
        }
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    pub fn detailed_status(&self) -> Option<DetailedStatus> {
        self.detailed_status
    }

    pub fn error_stack(&self) -> &[DeploymentErrorCode] {
        &self.error_stack
    }

    pub fn error_types(&self) -> &[DeploymentErrorType] {
        &self.error_types
    }

    pub fn failure_cause(&self) -> Option<&str> {
        self.failure_cause.as_deref()
    }

    /// States visited so far, with the time each was entered.
    pub fn history(&self) -> &[(DeploymentState, DateTime<Utc>)] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, next: DeploymentState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(
            deployment_id = %self.deployment_id,
            from = %self.state,
            to = %next,
            "Deployment state transition"
        );
        self.state = next;
        self.history.push((next, Utc::now()));
        Ok(())
    }

    pub fn succeed(&mut self) -> Result<(), IllegalTransition> {
        self.transition(DeploymentState::Succeeded)
    }

    /// Move to the terminal state `error` calls for and record its codes.
    pub fn fail_with(&mut self, error: &DeploymentError) -> Result<(), IllegalTransition> {
        self.transition(error.terminal_state())?;
        self.detailed_status = Some(error.detailed_status());
        self.error_stack = error.error_stack();
        self.error_types = error.error_types();
        self.failure_cause = Some(error.to_string());
        Ok(())
    }
}
