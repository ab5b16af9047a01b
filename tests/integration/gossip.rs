use serde_json::json;

use constellation_core::{NeighborRecord, NodeId};

use crate::*;

fn entry(freshness: u64, neighbours: &[u16]) -> Value {
    let neighbours: serde_json::Map<String, Value> = neighbours
        .iter()
        .map(|port| {
            (
                format!("10.0.0.9:{port}"),
                json!({
                    "ip": "10.0.0.9",
                    "port": port,
                    "function": "basestation",
                    "public_key": "00",
                    "last_contact": 1,
                }),
            )
        })
        .collect();
    json!({ "freshness": freshness, "neighbours": neighbours })
}

fn push(node: &str, entry: Value) -> Value {
    let mut constellation = serde_json::Map::new();
    constellation.insert(node.to_string(), entry);
    json!({ "constellation": constellation })
}

#[tokio::test]
async fn test_heartbeat_keeps_the_fresher_entry() {
    let a = spawn_node("disaster-imaging").await;
    let remote = "10.0.0.9:4000";

    let (status, ack) = post_json(
        &a.url("/heartbeat"),
        &push(remote, entry(100, &[4001])),
    )
    .await
    .unwrap();
    assert_eq!(status, 200);
    assert_eq!(ack["ack"], true);
    assert_eq!(ack["changed"], 1);

    let (_, ack) = post_json(
        &a.url("/heartbeat"),
        &push(remote, entry(50, &[4002])),
    )
    .await
    .unwrap();
    assert_eq!(ack["changed"], 0);

    let (_, view) = get_json(&a.url("/api/constellation")).await.unwrap();
    assert_eq!(view[remote]["freshness"], 100);
    assert!(view[remote]["neighbours"].get("10.0.0.9:4001").is_some());
}

#[tokio::test]
async fn test_heartbeat_cannot_overwrite_own_entry() {
    let a = spawn_node("disaster-imaging").await;
    a.node.gossip.push_cycle().await;
    let own = a.node.view.get(&a.id()).unwrap();

    post_json(
        &a.url("/heartbeat"),
        &push(&a.id().to_string(), entry(u64::MAX, &[4001])),
    )
    .await
    .unwrap();

    assert_eq!(a.node.view.get(&a.id()).unwrap(), own);
}

#[tokio::test]
async fn test_malformed_heartbeat_is_bad_request() {
    let a = spawn_node("disaster-imaging").await;
    let (status, body) = post_json(&a.url("/heartbeat"), &json!({ "constellation": 7 }))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["status_code"], 400);
}

#[tokio::test]
async fn test_push_cycle_spreads_the_view() {
    let (a, b, c) = chain().await;

    for n in [&a, &b, &c] {
        assert_eq!(n.node.view.len(), 3, "{} should see all three nodes", n.id());
    }

    let b_entry = a.node.view.get(&b.id()).unwrap();
    let expected: Vec<NodeId> = {
        let mut ids = vec![a.id(), c.id()];
        ids.sort();
        ids
    };
    assert_eq!(b_entry.neighbours.keys().cloned().collect::<Vec<_>>(), expected);
}

#[tokio::test]
async fn test_push_cycle_reports_unreachable_neighbours() {
    let a = spawn_node("disaster-imaging").await;
    let closed_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    a.node.neighbours.insert_if_absent(NeighborRecord {
        ip: "127.0.0.1".to_string(),
        port: closed_port,
        function: "basestation".to_string(),
        public_key: "00".to_string(),
        last_contact: constellation_core::now_ms(),
    });

    let report = a.node.gossip.push_cycle().await;
    assert_eq!(report.targets, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 0);
}

#[tokio::test]
async fn test_evicting_node_refuses_heartbeats_from_evicted_peer() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;
    a.node.handshake.initiate(&b.id()).await.unwrap();

    // b evicts a, as churn does
    let record = b.node.neighbours.remove(&a.id()).unwrap();
    b.node.blocklist.block(record);

    let contact = a.node.neighbours.get(&b.id()).unwrap().last_contact;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let report = a.node.gossip.push_cycle().await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.refused, 1);
    assert_eq!(a.node.neighbours.get(&b.id()).unwrap().last_contact, contact);
    assert!(b.node.view.get(&a.id()).is_none());

    // a body naming a blocklisted sender is refused without an envelope too
    let mut body = push(&a.id().to_string(), entry(u64::MAX, &[4001]));
    body["sender"] = json!(a.id().to_string());
    let (status, ack) = post_json(&b.url("/heartbeat"), &body).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(ack["ack"], false);
    assert!(b.node.view.get(&a.id()).is_none());
}
