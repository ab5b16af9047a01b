//! Manual heartbeat and churn triggers.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, post_json};

#[derive(Deserialize)]
struct HeartbeatTriggerResponse {
    targets: usize,
    delivered: usize,
    #[serde(default)]
    refused: usize,
    failed: usize,
    dropped: usize,
}

#[derive(Deserialize)]
struct ChurnTriggerResponse {
    evicted: Option<String>,
    promoted: Option<String>,
    promotion_failed: Option<String>,
}

pub async fn cmd_heartbeat(port: u16) -> Result<()> {
    let resp: HeartbeatTriggerResponse =
        post_json(&format!("{}/heartbeat/trigger", base_url(port))).await?;
    println!(
        "Heartbeat pushed to {} neighbours: {} delivered, {} refused, {} failed, {} stale dropped.",
        resp.targets, resp.delivered, resp.refused, resp.failed, resp.dropped
    );
    Ok(())
}

pub async fn cmd_churn(port: u16) -> Result<()> {
    let resp: ChurnTriggerResponse =
        post_json(&format!("{}/churn/trigger", base_url(port))).await?;

    match resp.evicted {
        Some(node) => println!("✗ evicted {}", node),
        None => println!("  nothing evicted"),
    }
    match (resp.promoted, resp.promotion_failed) {
        (Some(node), _) => println!("✓ promoted {}", node),
        (None, Some(node)) => println!("? handshake with {} failed", node),
        (None, None) => println!("  no pending candidate"),
    }
    Ok(())
}
