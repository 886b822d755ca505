//! Wire schema for deployment documents as delivered by the transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Deployment document exactly as it arrives, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeploymentDocument {
    #[serde(default, alias = "id")]
    pub deployment_id: String,

    #[serde(default, alias = "groupName")]
    pub target_group: String,

    /// Top-of-hierarchy group for sub-group deployments
    #[serde(default, alias = "onBehalfOfScope")]
    pub on_behalf_of: Option<String>,

    #[serde(default)]
    pub parent_group: Option<String>,

    #[serde(default, alias = "timestamp")]
    pub creation_timestamp: i64,

    #[serde(default)]
    pub revision: u64,

    /// Component name -> version
    #[serde(default, alias = "componentSpecification")]
    pub components: BTreeMap<String, String>,

    #[serde(default)]
    pub required_capabilities: Vec<String>,
}
