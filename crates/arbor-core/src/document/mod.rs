//! Deployment documents: immutable, validated deployment requests.

pub mod parser;
pub mod schema;

use std::collections::BTreeSet;

use crate::error::DeploymentError;
use crate::types::{ComponentSpecification, ScopeKey};

pub use parser::{parse_document_str, read_document_file};
pub use schema::RawDeploymentDocument;

/// A parsed deployment request. Fields are fixed once validation passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDocument {
    id: String,
    target_group: String,
    on_behalf_of: Option<ScopeKey>,
    parent_group: Option<String>,
    creation_timestamp: i64,
    components: ComponentSpecification,
    required_capabilities: BTreeSet<String>,
    revision: u64,
}

impl DeploymentDocument {
    pub fn builder(id: impl Into<String>, target_group: impl Into<String>) -> DocumentBuilder {
        DocumentBuilder {
            raw: RawDeploymentDocument {
                deployment_id: id.into(),
                target_group: target_group.into(),
                ..RawDeploymentDocument::default()
            },
        }
    }

    pub fn from_json(content: &str) -> Result<Self, DeploymentError> {
        parse_document_str(content)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_group(&self) -> &str {
        &self.target_group
    }

    pub fn on_behalf_of(&self) -> Option<&ScopeKey> {
        self.on_behalf_of.as_ref()
    }

    pub fn parent_group(&self) -> Option<&str> {
        self.parent_group.as_deref()
    }

    pub fn creation_timestamp(&self) -> i64 {
        self.creation_timestamp
    }

    pub fn components(&self) -> &ComponentSpecification {
        &self.components
    }

    pub fn required_capabilities(&self) -> &BTreeSet<String> {
        &self.required_capabilities
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when the document targets a group below its fleet root.
    pub fn is_sub_group_deployment(&self) -> bool {
        self.on_behalf_of
            .as_ref()
            .is_some_and(|scope| scope.as_str() != self.target_group)
    }
}

impl TryFrom<RawDeploymentDocument> for DeploymentDocument {
    type Error = DeploymentError;

    fn try_from(raw: RawDeploymentDocument) -> Result<Self, Self::Error> {
        if raw.deployment_id.trim().is_empty() {
            return Err(DeploymentError::invalid("deploymentId must not be empty"));
        }
        if raw.target_group.trim().is_empty() {
            return Err(DeploymentError::invalid("targetGroup must not be empty"));
        }
        if raw.creation_timestamp < 0 {
            return Err(DeploymentError::invalid(format!(
                "creationTimestamp must not be negative, got {}",
                raw.creation_timestamp
            )));
        }

        let on_behalf_of = match raw.on_behalf_of {
            Some(scope) if scope.trim().is_empty() => {
                return Err(DeploymentError::invalid("onBehalfOf must not be empty when set"));
            }
            Some(scope) => Some(ScopeKey::new(scope)),
            None => None,
        };

        if let Some(parent) = raw.parent_group.as_deref()
            && parent == raw.target_group
        {
            return Err(DeploymentError::invalid(format!(
                "parentGroup '{}' cannot be the target group itself",
                parent
            )));
        }

        for (name, version) in &raw.components {
            if name.trim().is_empty() {
                return Err(DeploymentError::invalid("component name must not be empty"));
            }
            semver::Version::parse(version).map_err(|e| {
                DeploymentError::invalid(format!(
                    "component '{}' has invalid version '{}': {}",
                    name, version, e
                ))
            })?;
        }

        Ok(Self {
            id: raw.deployment_id,
            target_group: raw.target_group,
            on_behalf_of,
            parent_group: raw.parent_group,
            creation_timestamp: raw.creation_timestamp,
            components: raw.components,
            required_capabilities: raw.required_capabilities.into_iter().collect(),
            revision: raw.revision,
        })
    }
}

/// Programmatic construction of documents, validated on `build`.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    raw: RawDeploymentDocument,
}

impl DocumentBuilder {
    pub fn on_behalf_of(mut self, scope: impl Into<String>) -> Self {
        self.raw.on_behalf_of = Some(scope.into());
        self
    }

    pub fn parent_group(mut self, parent: impl Into<String>) -> Self {
        self.raw.parent_group = Some(parent.into());
        self
    }

    pub fn creation_timestamp(mut self, timestamp: i64) -> Self {
        self.raw.creation_timestamp = timestamp;
        self
    }

    pub fn revision(mut self, revision: u64) -> Self {
        self.raw.revision = revision;
        self
    }

    pub fn component(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.raw.components.insert(name.into(), version.into());
        self
    }

    pub fn required_capability(mut self, capability: impl Into<String>) -> Self {
        self.raw.required_capabilities.push(capability.into());
        self
    }

    pub fn build(self) -> Result<DeploymentDocument, DeploymentError> {
        DeploymentDocument::try_from(self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_group_document_keeps_on_behalf_of_scope() {
        let doc = DeploymentDocument::builder("d-2", "thinggroup/sub1")
            .on_behalf_of("thinggroup/root")
            .parent_group("thinggroup/root")
            .creation_timestamp(200)
            .component("SimpleApp", "2.0.0")
            .build()
            .unwrap();

        assert!(doc.is_sub_group_deployment());
        assert_eq!(doc.on_behalf_of().unwrap().as_str(), "thinggroup/root");
    }

    #[test]
    fn invalid_component_version_is_rejected() {
        let err = DeploymentDocument::builder("d-1", "thinggroup/root")
            .component("SimpleApp", "latest")
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("SimpleApp"));
    }

    #[test]
    fn parent_equal_to_target_is_rejected() {
        let result = DeploymentDocument::builder("d-1", "thinggroup/root")
            .parent_group("thinggroup/root")
            .build();

        assert!(result.is_err());
    }
}
