//! Scope resolution for incoming deployments.

use std::sync::Arc;

use crate::document::DeploymentDocument;
use crate::error::DeploymentError;
use crate::membership::GroupMembershipProvider;
use crate::types::ScopeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSource {
    /// Sub-group deployment arbitrated against its fleet root.
    OnBehalfOf,
    /// Root deployment; the target group is the scope.
    TargetGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDecision {
    pub scope: ScopeKey,
    pub source: ScopeSource,
}

#[derive(Clone)]
pub struct ScopeResolver {
    membership: Arc<dyn GroupMembershipProvider>,
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver").finish_non_exhaustive()
    }
}

impl ScopeResolver {
    pub fn new(membership: Arc<dyn GroupMembershipProvider>) -> Self {
        Self { membership }
    }

    pub fn resolve(&self, document: &DeploymentDocument) -> Result<ScopeDecision, DeploymentError> {
        match document.on_behalf_of() {
            Some(scope) => self.resolve_on_behalf_of(document, scope),
            None => resolve_target_group(document),
        }
    }

    fn resolve_on_behalf_of(
        &self,
        document: &DeploymentDocument,
        scope: &ScopeKey,
    ) -> Result<ScopeDecision, DeploymentError> {
        let membership = self.membership.current_membership();
        if !membership.contains(scope.as_str()) {
            return Err(DeploymentError::InvalidHierarchy {
                scope: scope.clone(),
                reason: "device is not a member of this group hierarchy".to_string(),
            });
        }

        if scope.as_str() == document.target_group() {
            check_root_has_no_parent(document, scope)?;
        }

        Ok(ScopeDecision {
            scope: scope.clone(),
            source: ScopeSource::OnBehalfOf,
        })
    }
}

fn resolve_target_group(document: &DeploymentDocument) -> Result<ScopeDecision, DeploymentError> {
    let scope = ScopeKey::new(document.target_group());
    check_root_has_no_parent(document, &scope)?;
    Ok(ScopeDecision {
        scope,
        source: ScopeSource::TargetGroup,
    })
}

fn check_root_has_no_parent(
    document: &DeploymentDocument,
    scope: &ScopeKey,
) -> Result<(), DeploymentError> {
    match document.parent_group() {
        Some(parent) => Err(DeploymentError::InvalidHierarchy {
            scope: scope.clone(),
            reason: format!("root deployment names parent group '{}'", parent),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;

    fn resolver(groups: &[&str]) -> ScopeResolver {
        ScopeResolver::new(Arc::new(StaticMembership::new(groups.iter().copied())))
    }

    #[test]
    fn root_deployment_uses_target_group() {
        let doc = DeploymentDocument::builder("d1", "thinggroup/root")
            .build()
            .unwrap();

        let decision = resolver(&[]).resolve(&doc).unwrap();

        assert_eq!(decision.scope.as_str(), "thinggroup/root");
        assert_eq!(decision.source, ScopeSource::TargetGroup);
    }

    #[test]
    fn sub_group_deployment_uses_on_behalf_of() {
        let doc = DeploymentDocument::builder("d2", "thinggroup/sub1")
            .on_behalf_of("thinggroup/root")
            .parent_group("thinggroup/root")
            .build()
            .unwrap();

        let decision = resolver(&["thinggroup/root", "thinggroup/sub1"])
            .resolve(&doc)
            .unwrap();

        assert_eq!(decision.scope.as_str(), "thinggroup/root");
        assert_eq!(decision.source, ScopeSource::OnBehalfOf);
    }

    #[test]
    fn unknown_hierarchy_is_rejected() {
        let doc = DeploymentDocument::builder("d2", "thinggroup/sub1")
            .on_behalf_of("thinggroup/other-root")
            .build()
            .unwrap();

        let err = resolver(&["thinggroup/root"]).resolve(&doc).unwrap_err();

        assert!(matches!(err, DeploymentError::InvalidHierarchy { .. }));
    }

    #[test]
    fn root_deployment_with_parent_is_rejected() {
        let doc = DeploymentDocument::builder("d1", "thinggroup/root")
            .parent_group("thinggroup/above")
            .build()
            .unwrap();

        assert!(resolver(&[]).resolve(&doc).is_err());
    }
}
