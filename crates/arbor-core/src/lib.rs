//! Arbor Core Library
//!
//! On-device arbitration of fleet deployments: decides which incoming
//! deployment documents become the effective configuration for each group
//! hierarchy, keeps that record consistent across restarts, and reports
//! every outcome back to the fleet.

pub mod agent;
pub mod capability;
pub mod config;
pub mod context;
pub mod deploy;
mod diagnostics;
pub mod document;
pub mod effective;
pub mod error;
pub mod membership;
pub mod status;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Agent
    pub use crate::agent::Agent;
    pub use crate::config::AgentConfig;
    pub use crate::context::AgentContext;

    // Documents
    pub use crate::document::DeploymentDocument;
    pub use crate::types::{ComponentSpecification, DeploymentType, ScopeKey};

    // Processing
    pub use crate::capability::CapabilityGate;
    pub use crate::deploy::{
        ApplyPlan, CompletionHandle, DeploymentState, LifecycleRecord, RecordingLifecycleManager,
        ServiceLifecycleManager,
    };
    pub use crate::membership::{GroupMembershipProvider, StaticMembership};

    // Effective configuration
    pub use crate::effective::{EffectiveComponentSet, EffectiveConfigurationStore, ScopeWinner};

    // Errors
    pub use crate::error::{ApplyFailure, DeploymentError, DeploymentErrorCode};

    // Status
    pub use crate::status::{
        DeploymentStatus, DeploymentStatusConsumer, JobStatus, RecordingTransport,
        StatusReporter, StatusTransport,
    };
}
