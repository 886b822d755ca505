//! Shared core types used across the document, arbitration and store layers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Group name prefix used for deployments that target this device directly.
pub const DEVICE_GROUP_PREFIX: &str = "thing/";

/// Group name used for deployments created on the device itself.
pub const LOCAL_DEPLOYMENT_GROUP: &str = "LOCAL_DEPLOYMENT";

/// Complete component specification: component name -> version.
pub type ComponentSpecification = BTreeMap<String, String>;

/// Top-of-hierarchy group identity that deployments are arbitrated against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scopes that never come from fleet group membership.
    pub fn is_membership_exempt(&self) -> bool {
        self.0.starts_with(DEVICE_GROUP_PREFIX) || self.0 == LOCAL_DEPLOYMENT_GROUP
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Channel a deployment arrived on. Status consumers subscribe per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentType {
    /// Fleet job targeting a group.
    Jobs,
    /// Device shadow deployment.
    Shadow,
    /// Deployment created locally on the device.
    Local,
}

impl DeploymentType {
    pub const ALL: [DeploymentType; 3] = [
        DeploymentType::Jobs,
        DeploymentType::Shadow,
        DeploymentType::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Jobs => "JOBS",
            DeploymentType::Shadow => "SHADOW",
            DeploymentType::Local => "LOCAL",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DeploymentType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "jobs" | "job" => Ok(DeploymentType::Jobs),
            "shadow" => Ok(DeploymentType::Shadow),
            "local" => Ok(DeploymentType::Local),
            _ => anyhow::bail!(
                "Unknown deployment type: {}. Use 'jobs', 'shadow' or 'local'",
                value
            ),
        }
    }
}
