mod support;

use std::collections::BTreeMap;

use arbor_core::deploy::{DeploymentState, IngressError};
use arbor_core::types::{DeploymentType, ScopeKey};

use support::{ROOT, SUB1, root_doc, start_agent, sub_doc};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_are_processed_one_at_a_time() {
    let (agent, manager) = start_agent();

    let mut producers = Vec::new();
    for producer in 0..8i64 {
        let sender = agent.sender();
        producers.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for n in 0..10i64 {
                // interleave timestamps across producers
                let ts = n * 8 + producer + 1;
                let id = format!("p{producer}-{n}");
                let doc = if producer % 2 == 0 {
                    root_doc(&id, ts, &[("SimpleApp", "1.0.0")])
                } else {
                    sub_doc(&id, SUB1, ts, &[("SimpleApp", "2.0.0")])
                };
                handles.push((ts, sender.enqueue(DeploymentType::Jobs, doc).unwrap()));
            }
            handles
        }));
    }

    let mut timestamps = BTreeMap::new();
    let mut records = Vec::new();
    for producer in producers {
        for (ts, handle) in producer.await.unwrap() {
            timestamps.insert(handle.deployment_id().to_string(), ts);
            records.push(handle.wait().await.unwrap());
        }
    }

    assert_eq!(records.len(), 80);
    assert!(records.iter().all(|record| record.is_terminal()));

    // acceptance order is strictly increasing in creation timestamp
    let accepted: Vec<i64> = manager
        .applied()
        .iter()
        .map(|plan| timestamps[&plan.deployment_id])
        .collect();
    assert!(accepted.windows(2).all(|pair| pair[0] < pair[1]));

    let winner = agent.context().store().get_winner(&ScopeKey::new(ROOT)).unwrap();
    assert_eq!(winner.creation_timestamp, 80);

    let succeeded = records
        .iter()
        .filter(|record| record.state() == DeploymentState::Succeeded)
        .count();
    assert_eq!(succeeded, accepted.len());
    agent.shutdown().await;
}

#[tokio::test]
async fn handle_outlives_producer_and_resolves() {
    let (agent, _) = start_agent();
    let sender = agent.sender();

    let handle = tokio::spawn(async move {
        sender
            .enqueue(DeploymentType::Jobs, root_doc("detached", 10, &[]))
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(handle.deployment_id(), "detached");
    assert_eq!(handle.wait().await.unwrap().state(), DeploymentState::Succeeded);
    agent.shutdown().await;
}

#[tokio::test]
async fn sender_fails_once_agent_is_shut_down() {
    let (agent, _) = start_agent();
    let sender = agent.sender();
    agent.shutdown().await;

    let err = sender
        .enqueue(DeploymentType::Jobs, root_doc("late", 10, &[]))
        .unwrap_err();
    assert_eq!(err, IngressError::Closed);
}
