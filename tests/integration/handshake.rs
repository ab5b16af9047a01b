use serde_json::json;

use constellation_services::handshake::HandshakeOutcome;

use crate::*;

#[tokio::test]
async fn test_identify_reports_function() {
    let a = spawn_node("whale-tracking").await;

    let (status, body) = get_json(&a.url("/id")).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"], "whale-tracking");
}

#[tokio::test]
async fn test_handshake_makes_both_sides_neighbours() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;

    let outcome = a.node.handshake.initiate(&b.id()).await.unwrap();
    assert!(matches!(outcome, HandshakeOutcome::Established(_)));

    let on_a = a.node.neighbours.get(&b.id()).expect("b should be a's neighbour");
    assert_eq!(on_a.function, "whale-tracking");
    let on_b = b.node.neighbours.get(&a.id()).expect("a should be b's neighbour");
    assert_eq!(on_b.function, "disaster-imaging");

    let again = a.node.handshake.initiate(&b.id()).await.unwrap();
    assert_eq!(again, HandshakeOutcome::AlreadyNeighbour);

    let (status, body) = get_json(&b.url("/api/neighbours")).await.unwrap();
    assert_eq!(status, 200);
    let listed = body["neighbours"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["port"], a.id().port);
}

#[tokio::test]
async fn test_handshake_rejects_unknown_function() {
    let a = spawn_node("disaster-imaging").await;

    let (status, body) = post_json(
        &a.url("/handshake"),
        &json!({
            "device_name": "intruder",
            "device_function": "toaster",
            "public_key": "00",
            "port": 40000,
            "connected_nodes": [],
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("toaster"));
    assert!(a.node.neighbours.is_empty());
}

#[tokio::test]
async fn test_handshake_with_blocklisted_node_is_refused() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;

    a.node.handshake.initiate(&b.id()).await.unwrap();
    let record = b.node.neighbours.remove(&a.id()).unwrap();
    b.node.blocklist.block(record);

    let (status, body) = post_json(
        &b.url("/handshake"),
        &json!({
            "device_name": "sat-a",
            "device_function": "disaster-imaging",
            "public_key": "00",
            "port": a.id().port,
            "connected_nodes": [],
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["outcome"], "blocked");
    assert!(!b.node.neighbours.contains(&a.id()));
}

#[tokio::test]
async fn test_initiator_blocklisted_by_peer_records_nothing() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;

    a.node.handshake.initiate(&b.id()).await.unwrap();
    let record = b.node.neighbours.remove(&a.id()).unwrap();
    b.node.blocklist.block(record);
    a.node.neighbours.remove(&b.id()).unwrap();

    let outcome = a.node.handshake.initiate(&b.id()).await.unwrap();
    assert_eq!(outcome, HandshakeOutcome::Refused);
    assert!(!a.node.neighbours.contains(&b.id()));
    assert!(!b.node.neighbours.contains(&a.id()));
}
