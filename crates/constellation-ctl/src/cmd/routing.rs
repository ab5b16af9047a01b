//! Routing table inspection, route requests and relay forwarding.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, node_url, post_json_body};

#[derive(Deserialize)]
struct Route {
    path: Vec<String>,
    #[serde(rename = "type")]
    route_type: String,
    score: f64,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct RoutesResponse {
    source: String,
    routes: BTreeMap<String, Vec<Route>>,
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    source: &'a str,
    destination: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'a str>,
}

#[derive(Deserialize)]
struct DeliveryReport {
    delivered: bool,
    path_taken: Vec<String>,
    failed_nodes: Vec<String>,
    attempts: u32,
}

#[derive(Deserialize)]
struct RouteResponse {
    status: String,
    selected_route: Route,
    delivery: DeliveryReport,
}

#[derive(Serialize)]
struct OriginateRequest<'a> {
    destination: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct ForwardResponse {
    delivered: bool,
    message_id: String,
    hops: Vec<String>,
}

fn print_route(route: &Route) {
    println!(
        "  {:<14} {:>7.2}  {}",
        route.route_type,
        route.score,
        route.path.join(" → ")
    );
    if !route.metrics.is_empty() {
        let metrics: Vec<String> = route
            .metrics
            .iter()
            .map(|(k, v)| format!("{}={:.2}", k, v))
            .collect();
        println!("  {:<14} {}", "", metrics.join(" "));
    }
}

pub async fn cmd_routes(port: u16, dest: Option<&str>) -> Result<()> {
    let url = match dest {
        Some(d) => format!("{}/routes?dest={}", base_url(port), d),
        None => format!("{}/routes", base_url(port)),
    };
    let resp: RoutesResponse = get_json(&url).await?;

    if resp.routes.is_empty() {
        println!("No routes from {}.", resp.source);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Routes from {}", resp.source);
    println!("═══════════════════════════════════════");

    for (destination, routes) in &resp.routes {
        println!("\n  → {} ({} routes)", destination, routes.len());
        for route in routes {
            print_route(route);
        }
    }

    Ok(())
}

pub async fn cmd_route(
    port: u16,
    source: &str,
    destination: &str,
    priority: Option<&str>,
    message: &str,
) -> Result<()> {
    let req = RouteRequest {
        source,
        destination,
        message,
        priority,
    };
    let resp: RouteResponse = post_json_body(&format!("{}/route", node_url(port)), &req).await?;

    println!("Status: {}", resp.status);
    println!("Selected route:");
    print_route(&resp.selected_route);

    let d = &resp.delivery;
    let icon = if d.delivered { "✓" } else { "✗" };
    println!(
        "{} delivery after {} attempt(s): {}",
        icon,
        d.attempts,
        d.path_taken.join(" → ")
    );
    if !d.failed_nodes.is_empty() {
        println!("  failed nodes: {}", d.failed_nodes.join(", "));
    }

    Ok(())
}

pub async fn cmd_forward(port: u16, destination: &str, message: &str) -> Result<()> {
    let req = OriginateRequest {
        destination,
        message,
    };
    let resp: ForwardResponse =
        post_json_body(&format!("{}/forward", base_url(port)), &req).await?;

    let icon = if resp.delivered { "✓" } else { "✗" };
    println!("{} message {}", icon, &resp.message_id[..resp.message_id.len().min(16)]);
    println!("  hops: {}", resp.hops.join(" → "));

    Ok(())
}
