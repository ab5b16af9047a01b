use serde_json::json;

use crate::*;

#[tokio::test]
async fn test_forward_relays_hop_by_hop() {
    let (a, b, c) = chain().await;

    let (status, body) = post_json(
        &a.url("/api/forward"),
        &json!({ "destination": c.id().to_string(), "message": "whale pod heading north" }),
    )
    .await
    .unwrap();
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["delivered"], true);
    assert_eq!(
        body["hops"],
        json!([a.id().to_string(), b.id().to_string(), c.id().to_string()])
    );
    assert_eq!(body["message_id"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_forward_loop_is_rejected() {
    let (a, b, c) = chain().await;

    let (status, body) = post_json(
        &b.url("/forward"),
        &json!({
            "source": a.id().to_string(),
            "destination": c.id().to_string(),
            "message": "echo",
            "hops": [a.id().to_string(), b.id().to_string()],
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 409);
    assert_eq!(body["code"], "LOOP_DETECTED");
}

#[tokio::test]
async fn test_forward_hop_limit_is_enforced() {
    let (a, b, c) = chain().await;
    let hops: Vec<String> = (1..=16).map(|p| format!("10.0.0.1:{p}")).collect();

    let (status, body) = post_json(
        &b.url("/forward"),
        &json!({
            "source": a.id().to_string(),
            "destination": c.id().to_string(),
            "message": "far travelled",
            "hops": hops,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 409);
    assert_eq!(body["code"], "HOP_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_forward_without_route_is_not_found() {
    let a = spawn_node("disaster-imaging").await;
    let (status, body) = post_json(
        &a.url("/api/forward"),
        &json!({ "destination": "10.9.9.9:1", "message": "lost" }),
    )
    .await
    .unwrap();
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NO_ROUTE");
}
