use serde_json::json;

use crate::*;

#[tokio::test]
async fn test_status_shape() {
    let (a, _b, _c) = chain().await;

    let (status, body) = get_json(&a.url("/api/status")).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["node"], a.id().to_string());
    assert_eq!(body["function"], "disaster-imaging");
    assert_eq!(body["neighbours"], 1);
    assert_eq!(body["view_entries"], 3);
    assert!(body["routes"].as_u64().unwrap() >= 2);
    assert_eq!(body["gossip_phase"], "idle");
}

#[tokio::test]
async fn test_blocklist_remove() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;
    a.node.handshake.initiate(&b.id()).await.unwrap();
    let record = a.node.neighbours.remove(&b.id()).unwrap();
    a.node.blocklist.block(record);

    let (_, listed) = get_json(&a.url("/api/blocklist")).await.unwrap();
    assert_eq!(listed["blocklisted"].as_array().unwrap().len(), 1);

    let (status, body) = post_json(
        &a.url("/api/blocklist/remove"),
        &json!({ "node": b.id().to_string() }),
    )
    .await
    .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["removed"]["port"], b.id().port);
    assert!(a.node.blocklist.is_empty());

    let (status, _) = post_json(
        &a.url("/api/blocklist/remove"),
        &json!({ "node": b.id().to_string() }),
    )
    .await
    .unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_heartbeat_trigger_pushes_to_neighbours() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;
    a.node.handshake.initiate(&b.id()).await.unwrap();

    let (status, body) = post_json(&a.url("/api/heartbeat/trigger"), &json!({})).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["targets"], 1);
    assert_eq!(body["delivered"], 1);
    assert!(b.node.view.get(&a.id()).is_some());
}

#[tokio::test]
async fn test_churn_keeps_the_minimum_neighbour_count() {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;
    a.node.handshake.initiate(&b.id()).await.unwrap();

    let (status, body) = post_json(&a.url("/api/churn/trigger"), &json!({})).await.unwrap();
    assert_eq!(status, 200);
    assert!(body["evicted"].is_null());
    assert!(a.node.neighbours.contains(&b.id()));
}
