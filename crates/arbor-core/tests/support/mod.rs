#![allow(dead_code)]

use std::sync::Arc;

use arbor_core::agent::Agent;
use arbor_core::config::AgentConfig;
use arbor_core::context::AgentContext;
use arbor_core::deploy::RecordingLifecycleManager;
use arbor_core::document::DeploymentDocument;

pub const ROOT: &str = "thinggroup/root";
pub const SUB1: &str = "thinggroup/sub1";
pub const SUB2: &str = "thinggroup/sub2";

pub fn config_with_memberships(groups: &[&str]) -> AgentConfig {
    AgentConfig {
        memberships: groups.iter().map(|group| group.to_string()).collect(),
        ..AgentConfig::default()
    }
}

/// In-memory agent belonging to the root hierarchy.
pub fn start_agent() -> (Agent, Arc<RecordingLifecycleManager>) {
    start_agent_with(config_with_memberships(&[ROOT, SUB1, SUB2]))
}

pub fn start_agent_with(config: AgentConfig) -> (Agent, Arc<RecordingLifecycleManager>) {
    let manager = Arc::new(RecordingLifecycleManager::new());
    let agent = Agent::start(AgentContext::in_memory(config), manager.clone());
    (agent, manager)
}

/// Root deployment for `ROOT`.
pub fn root_doc(id: &str, ts: i64, components: &[(&str, &str)]) -> DeploymentDocument {
    let mut builder = DeploymentDocument::builder(id, ROOT).creation_timestamp(ts);
    for (name, version) in components {
        builder = builder.component(*name, *version);
    }
    builder.build().unwrap()
}

/// Sub-group deployment arbitrated against `ROOT`.
pub fn sub_doc(id: &str, target: &str, ts: i64, components: &[(&str, &str)]) -> DeploymentDocument {
    let mut builder = DeploymentDocument::builder(id, target)
        .on_behalf_of(ROOT)
        .parent_group(ROOT)
        .creation_timestamp(ts);
    for (name, version) in components {
        builder = builder.component(*name, *version);
    }
    builder.build().unwrap()
}
