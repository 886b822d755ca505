//! Deployment error taxonomy.
//!
//! Every terminal non-success outcome is a [`DeploymentError`]. The error
//! decides which terminal state the lifecycle lands in and renders the
//! structured `errorStack`, `errorTypes` and `detailedStatus` fields that the
//! status channels carry verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deploy::lifecycle::DeploymentState;
use crate::types::ScopeKey;

/// Cause codes reported in an error stack, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentErrorCode {
    DeploymentFailure,
    DeploymentRejected,
    RejectedStaleDeployment,
    NucleusMissingRequiredCapabilities,
    InvalidGroupHierarchy,
    DeploymentDocumentNotValid,
    DeploymentDocumentParseError,
    ComponentUpdateError,
    IoWriteError,
}

impl DeploymentErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentErrorCode::DeploymentFailure => "DEPLOYMENT_FAILURE",
            DeploymentErrorCode::DeploymentRejected => "DEPLOYMENT_REJECTED",
            DeploymentErrorCode::RejectedStaleDeployment => "REJECTED_STALE_DEPLOYMENT",
            DeploymentErrorCode::NucleusMissingRequiredCapabilities => {
                "NUCLEUS_MISSING_REQUIRED_CAPABILITIES"
            }
            DeploymentErrorCode::InvalidGroupHierarchy => "INVALID_GROUP_HIERARCHY",
            DeploymentErrorCode::DeploymentDocumentNotValid => "DEPLOYMENT_DOCUMENT_NOT_VALID",
            DeploymentErrorCode::DeploymentDocumentParseError => "DEPLOYMENT_DOCUMENT_PARSE_ERROR",
            DeploymentErrorCode::ComponentUpdateError => "COMPONENT_UPDATE_ERROR",
            DeploymentErrorCode::IoWriteError => "IO_WRITE_ERROR",
        }
    }

    /// Classification reported beside the stack. `None` codes are generic
    /// wrappers and are left out of the `errorTypes` list.
    pub fn error_type(&self) -> Option<DeploymentErrorType> {
        match self {
            DeploymentErrorCode::DeploymentFailure
            | DeploymentErrorCode::DeploymentRejected
            | DeploymentErrorCode::RejectedStaleDeployment => None,
            DeploymentErrorCode::NucleusMissingRequiredCapabilities
            | DeploymentErrorCode::InvalidGroupHierarchy
            | DeploymentErrorCode::DeploymentDocumentNotValid
            | DeploymentErrorCode::DeploymentDocumentParseError => {
                Some(DeploymentErrorType::RequestError)
            }
            DeploymentErrorCode::ComponentUpdateError => Some(DeploymentErrorType::ComponentError),
            DeploymentErrorCode::IoWriteError => Some(DeploymentErrorType::DeviceError),
        }
    }
}

impl fmt::Display for DeploymentErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a failure's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentErrorType {
    RequestError,
    ComponentError,
    DeviceError,
}

impl DeploymentErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentErrorType::RequestError => "REQUEST_ERROR",
            DeploymentErrorType::ComponentError => "COMPONENT_ERROR",
            DeploymentErrorType::DeviceError => "DEVICE_ERROR",
        }
    }
}

/// Structured reason attached to non-SUCCEEDED terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailedStatus {
    StaleDeployment,
    UnsupportedCapability,
    InvalidHierarchy,
    MalformedDocument,
    ApplyFailed,
    StoreWriteFailed,
}

impl DetailedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailedStatus::StaleDeployment => "STALE_DEPLOYMENT",
            DetailedStatus::UnsupportedCapability => "UNSUPPORTED_CAPABILITY",
            DetailedStatus::InvalidHierarchy => "INVALID_HIERARCHY",
            DetailedStatus::MalformedDocument => "MALFORMED_DOCUMENT",
            DetailedStatus::ApplyFailed => "APPLY_FAILED",
            DetailedStatus::StoreWriteFailed => "STORE_WRITE_FAILED",
        }
    }
}

impl fmt::Display for DetailedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a malformed document failed to parse or failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    Parse,
    Invalid,
}

/// Failure reported by the service lifecycle manager for the apply step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApplyFailure {
    pub message: String,
    /// Component the manager blames, when it can name one.
    pub component: Option<String>,
}

impl ApplyFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            component: None,
        }
    }

    pub fn for_component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            component: Some(component.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeploymentError {
    #[error("Malformed deployment document: {reason}")]
    MalformedDocument { kind: MalformedKind, reason: String },

    #[error("Device does not support required capabilities: {}", .missing.join(", "))]
    UnsupportedCapability { missing: Vec<String> },

    #[error("Invalid group hierarchy for scope '{scope}': {reason}")]
    InvalidHierarchy { scope: ScopeKey, reason: String },

    #[error(
        "Stale deployment for scope '{scope}': creation timestamp {candidate} does not exceed current winner {winner}"
    )]
    StaleDeployment {
        scope: ScopeKey,
        candidate: i64,
        winner: i64,
    },

    #[error("Failed to apply deployment: {0}")]
    Apply(#[from] ApplyFailure),

    #[error("Failed to persist effective configuration: {reason}")]
    Persistence { reason: String },
}

/// Result type for deployment pipeline stages.
pub type Result<T> = std::result::Result<T, DeploymentError>;

impl DeploymentError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            kind: MalformedKind::Parse,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            kind: MalformedKind::Invalid,
            reason: reason.into(),
        }
    }

    /// Terminal lifecycle state this error drives a deployment into.
    pub fn terminal_state(&self) -> DeploymentState {
        match self {
            DeploymentError::Apply(_) | DeploymentError::Persistence { .. } => {
                DeploymentState::Failed
            }
            _ => DeploymentState::Rejected,
        }
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        match self {
            DeploymentError::MalformedDocument { .. } => DetailedStatus::MalformedDocument,
            DeploymentError::UnsupportedCapability { .. } => DetailedStatus::UnsupportedCapability,
            DeploymentError::InvalidHierarchy { .. } => DetailedStatus::InvalidHierarchy,
            DeploymentError::StaleDeployment { .. } => DetailedStatus::StaleDeployment,
            DeploymentError::Apply(_) => DetailedStatus::ApplyFailed,
            DeploymentError::Persistence { .. } => DetailedStatus::StoreWriteFailed,
        }
    }

    /// Cause codes, outermost first. Never empty.
    pub fn error_stack(&self) -> Vec<DeploymentErrorCode> {
        let generic = match self.terminal_state() {
            DeploymentState::Failed => DeploymentErrorCode::DeploymentFailure,
            _ => DeploymentErrorCode::DeploymentRejected,
        };
        let cause = match self {
            DeploymentError::MalformedDocument {
                kind: MalformedKind::Parse,
                ..
            } => DeploymentErrorCode::DeploymentDocumentParseError,
            DeploymentError::MalformedDocument {
                kind: MalformedKind::Invalid,
                ..
            } => DeploymentErrorCode::DeploymentDocumentNotValid,
            DeploymentError::UnsupportedCapability { .. } => {
                DeploymentErrorCode::NucleusMissingRequiredCapabilities
            }
            DeploymentError::InvalidHierarchy { .. } => DeploymentErrorCode::InvalidGroupHierarchy,
            DeploymentError::StaleDeployment { .. } => DeploymentErrorCode::RejectedStaleDeployment,
            DeploymentError::Apply(_) => DeploymentErrorCode::ComponentUpdateError,
            DeploymentError::Persistence { .. } => DeploymentErrorCode::IoWriteError,
        };
        vec![generic, cause]
    }

    /// Distinct error types for the stack, in stack order.
    pub fn error_types(&self) -> Vec<DeploymentErrorType> {
        let mut types = Vec::new();
        for code in self.error_stack() {
            if let Some(error_type) = code.error_type()
                && !types.contains(&error_type)
            {
                types.push(error_type);
            }
        }
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_deployment_stack_matches_reported_codes() {
        let err = DeploymentError::StaleDeployment {
            scope: ScopeKey::new("thinggroup/root"),
            candidate: 350,
            winner: 500,
        };

        let stack: Vec<&str> = err.error_stack().iter().map(|c| c.as_str()).collect();

        assert_eq!(stack, vec!["DEPLOYMENT_REJECTED", "REJECTED_STALE_DEPLOYMENT"]);
        assert_eq!(err.detailed_status(), DetailedStatus::StaleDeployment);
        assert_eq!(err.terminal_state(), DeploymentState::Rejected);
        assert!(err.error_types().is_empty());
    }

    #[test]
    fn apply_failure_is_failed_not_rejected() {
        let err = DeploymentError::from(ApplyFailure::for_component("SimpleApp", "exit 1"));

        assert_eq!(err.terminal_state(), DeploymentState::Failed);
        assert_eq!(
            err.error_stack(),
            vec![
                DeploymentErrorCode::DeploymentFailure,
                DeploymentErrorCode::ComponentUpdateError
            ]
        );
        assert_eq!(err.error_types(), vec![DeploymentErrorType::ComponentError]);
    }

    #[test]
    fn unsupported_capability_lists_missing_tokens() {
        let err = DeploymentError::UnsupportedCapability {
            missing: vec!["UNKNOWN_CAP".to_string()],
        };

        assert!(err.to_string().contains("UNKNOWN_CAP"));
        assert_eq!(err.detailed_status().as_str(), "UNSUPPORTED_CAPABILITY");
        assert_eq!(err.error_types(), vec![DeploymentErrorType::RequestError]);
    }

    #[test]
    fn parse_and_validation_failures_use_distinct_codes() {
        let parse = DeploymentError::parse("expected value");
        let invalid = DeploymentError::invalid("empty id");

        assert_eq!(
            parse.error_stack()[1],
            DeploymentErrorCode::DeploymentDocumentParseError
        );
        assert_eq!(
            invalid.error_stack()[1],
            DeploymentErrorCode::DeploymentDocumentNotValid
        );
    }
}
