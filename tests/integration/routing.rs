use serde_json::json;

use crate::*;

#[tokio::test]
async fn test_routes_lists_paths_to_every_destination() {
    let (a, b, c) = chain().await;

    let (status, body) = get_json(&a.url("/api/routes")).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["source"], a.id().to_string());
    let routes = body["routes"].as_object().unwrap();
    assert!(routes.contains_key(&b.id().to_string()));
    assert!(routes.contains_key(&c.id().to_string()));

    let to_b = routes[&b.id().to_string()].as_array().unwrap();
    assert_eq!(to_b[0]["type"], "DIRECT");
    assert_eq!(to_b[0]["score"], 100.0);
}

#[tokio::test]
async fn test_routes_to_unknown_destination_is_not_found() {
    let (a, _b, _c) = chain().await;
    let (status, _) = get_json(&a.url("/api/routes?dest=10.9.9.9:1")).await.unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_route_simulates_delivery() {
    let (a, b, c) = chain().await;

    let (status, body) = post_json(
        &a.url("/route"),
        &json!({
            "source": a.id().to_string(),
            "destination": c.id().to_string(),
            "message": "survivors at grid 4",
            "priority": "high",
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["delivery"]["delivered"], true);
    assert_eq!(
        body["delivery"]["path_taken"],
        json!([b.id().to_string(), c.id().to_string()])
    );
    assert!(body["routing_table"][&c.id().to_string()].is_array());
}

#[tokio::test]
async fn test_route_exhausted_when_relay_fails() {
    let (a, b, c) = chain().await;
    a.failures.fail(&b.id());

    let (status, body) = post_json(
        &a.url("/route"),
        &json!({
            "source": a.id().to_string(),
            "destination": c.id().to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, 503);
    assert_eq!(body["code"], "ALL_ROUTES_EXHAUSTED");
    assert_eq!(body["failed_nodes"], json!([b.id().to_string()]));
}

#[tokio::test]
async fn test_route_to_self_is_bad_request() {
    let a = spawn_node("disaster-imaging").await;
    let (status, _) = post_json(
        &a.url("/route"),
        &json!({ "source": a.id().to_string(), "destination": a.id().to_string() }),
    )
    .await
    .unwrap();
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_route_without_table_entry_is_not_found() {
    let (a, _b, _c) = chain().await;
    let (status, body) = post_json(
        &a.url("/route"),
        &json!({ "source": a.id().to_string(), "destination": "10.9.9.9:1" }),
    )
    .await
    .unwrap();
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NO_ROUTE");
}
