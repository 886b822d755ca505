//! Group membership as reported by the discovery collaborator.

use std::collections::BTreeSet;
use std::sync::RwLock;

/// Source of the groups this device currently belongs to.
pub trait GroupMembershipProvider: Send + Sync {
    fn current_membership(&self) -> BTreeSet<String>;
}

/// Membership held in memory and updated by whoever discovers it.
#[derive(Debug, Default)]
pub struct StaticMembership {
    groups: RwLock<BTreeSet<String>>,
}

impl StaticMembership {
    pub fn new<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            groups: RwLock::new(groups.into_iter().map(Into::into).collect()),
        }
    }

    /// Replace the membership set wholesale.
    pub fn set<I, S>(&self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: BTreeSet<String> = groups.into_iter().map(Into::into).collect();
        match self.groups.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl GroupMembershipProvider for StaticMembership {
    fn current_membership(&self) -> BTreeSet<String> {
        match self.groups.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_groups() {
        let membership = StaticMembership::new(["thinggroup/root", "thinggroup/old"]);

        membership.set(["thinggroup/root"]);

        let groups = membership.current_membership();
        assert_eq!(groups.len(), 1);
        assert!(groups.contains("thinggroup/root"));
    }
}
