mod support;

use arbor_core::config::AgentConfig;
use arbor_core::deploy::DeploymentState;
use arbor_core::document::DeploymentDocument;
use arbor_core::types::{DeploymentType, ScopeKey};

use support::{config_with_memberships, start_agent_with};

fn doc(id: &str, group: &str, ts: i64, component: &str) -> DeploymentDocument {
    DeploymentDocument::builder(id, group)
        .creation_timestamp(ts)
        .component(component, "1.0.0")
        .build()
        .unwrap()
}

#[tokio::test]
async fn leaving_a_group_drops_its_components_on_next_acceptance() {
    let (agent, manager) = start_agent_with(config_with_memberships(&[
        "thinggroup/a",
        "thinggroup/b",
    ]));
    for deployment in [
        doc("a1", "thinggroup/a", 10, "FromA"),
        doc("b1", "thinggroup/b", 20, "FromB"),
        doc("local", "LOCAL_DEPLOYMENT", 30, "LocalTool"),
        doc("thing", "thing/device-1", 40, "DeviceAgent"),
    ] {
        agent
            .enqueue(DeploymentType::Jobs, deployment)
            .unwrap()
            .wait()
            .await
            .unwrap();
    }
    assert_eq!(agent.effective_components().len(), 4);

    agent.context().membership().set(["thinggroup/b"]);
    agent
        .enqueue(DeploymentType::Jobs, doc("b2", "thinggroup/b", 50, "FromB"))
        .unwrap()
        .wait()
        .await
        .unwrap();

    let store = agent.context().store();
    assert!(store.get_winner(&ScopeKey::new("thinggroup/a")).is_none());
    assert!(store.get_winner(&ScopeKey::new("LOCAL_DEPLOYMENT")).is_some());
    assert!(store.get_winner(&ScopeKey::new("thing/device-1")).is_some());

    let plan = manager.last_applied().unwrap();
    assert!(!plan.components.contains("FromA"));
    assert!(plan.components.contains("LocalTool"));
    assert!(plan.components.contains("DeviceAgent"));
    agent.shutdown().await;
}

#[tokio::test]
async fn accepted_scope_is_kept_even_outside_membership() {
    let (agent, _) = start_agent_with(config_with_memberships(&[]));

    agent
        .enqueue(DeploymentType::Jobs, doc("x1", "thinggroup/x", 10, "FromX"))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(
        agent
            .context()
            .store()
            .get_winner(&ScopeKey::new("thinggroup/x"))
            .is_some()
    );
    agent.shutdown().await;
}

#[tokio::test]
async fn pruning_can_be_disabled() {
    let mut config = config_with_memberships(&["thinggroup/a", "thinggroup/b"]);
    config.prune_departed_groups = false;
    let (agent, _) = start_agent_with(config);

    agent
        .enqueue(DeploymentType::Jobs, doc("a1", "thinggroup/a", 10, "FromA"))
        .unwrap()
        .wait()
        .await
        .unwrap();
    agent.context().membership().set(["thinggroup/b"]);
    agent
        .enqueue(DeploymentType::Jobs, doc("b1", "thinggroup/b", 20, "FromB"))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(agent.context().store().list_scopes().len(), 2);
    assert!(agent.effective_components().contains("FromA"));
    agent.shutdown().await;
}

#[tokio::test]
async fn unreported_root_scopes_survive_each_other() {
    let (agent, _) = start_agent_with(AgentConfig::default());
    let a500 = DeploymentDocument::builder("a500", "thinggroup/a")
        .creation_timestamp(500)
        .component("FromA", "2.0.0")
        .build()
        .unwrap();
    let b10 = doc("b10", "thinggroup/b", 10, "FromB");
    let a350 = doc("a350", "thinggroup/a", 350, "StaleA");

    let mut states = Vec::new();
    for deployment in [a500, b10, a350] {
        let record = agent
            .enqueue(DeploymentType::Jobs, deployment)
            .unwrap()
            .wait()
            .await
            .unwrap();
        states.push(record.state());
    }

    assert_eq!(
        states,
        vec![
            DeploymentState::Succeeded,
            DeploymentState::Succeeded,
            DeploymentState::Rejected
        ]
    );
    let effective = agent.effective_components();
    assert_eq!(effective.get("FromA"), Some("2.0.0"));
    assert_eq!(effective.get("FromB"), Some("1.0.0"));
    assert!(!effective.contains("StaleA"));
    agent.shutdown().await;
}

#[tokio::test]
async fn departure_is_measured_against_last_reported_membership() {
    let (agent, _) = start_agent_with(config_with_memberships(&["thinggroup/a"]));
    for deployment in [
        doc("a1", "thinggroup/a", 10, "FromA"),
        doc("x1", "thinggroup/x", 20, "FromX"),
    ] {
        agent
            .enqueue(DeploymentType::Jobs, deployment)
            .unwrap()
            .wait()
            .await
            .unwrap();
    }

    agent.context().membership().set(Vec::<String>::new());
    agent
        .enqueue(DeploymentType::Jobs, doc("y1", "thinggroup/y", 30, "FromY"))
        .unwrap()
        .wait()
        .await
        .unwrap();

    let scopes = agent.context().store().list_scopes();
    assert!(!scopes.contains(&ScopeKey::new("thinggroup/a")));
    assert!(scopes.contains(&ScopeKey::new("thinggroup/x")));
    assert!(scopes.contains(&ScopeKey::new("thinggroup/y")));
    agent.shutdown().await;
}
