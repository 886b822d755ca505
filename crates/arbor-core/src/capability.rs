//! Capability gate: checks declared requirements against what this device supports.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::DeploymentError;

/// Capabilities every build of the agent supports.
pub const DEFAULT_CAPABILITIES: [&str; 3] = [
    "LARGE_CONFIGURATION",
    "LINUX_RESOURCE_LIMITS",
    "SUB_DEPLOYMENTS",
];

#[derive(Debug, Clone)]
pub struct CapabilityGate {
    supported: BTreeSet<String>,
}

impl Default for CapabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPABILITIES)
    }
}

impl CapabilityGate {
    pub fn new<I, S>(supported: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: supported.into_iter().map(Into::into).collect(),
        }
    }

    pub fn supported(&self) -> &BTreeSet<String> {
        &self.supported
    }

    /// Accept when every required capability is supported.
    ///
    /// The error lists every missing token in sorted order.
    pub fn check(&self, required: &BTreeSet<String>) -> Result<(), DeploymentError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|capability| !self.supported.contains(*capability))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }
        debug!(missing = ?missing, "Deployment requires unsupported capabilities");
        Err(DeploymentError::UnsupportedCapability { missing })
    }
}
