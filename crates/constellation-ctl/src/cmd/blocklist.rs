//! Blocklist commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};
use super::status::{short_key, NeighbourRecord};

#[derive(Deserialize)]
struct BlocklistResponse {
    blocklisted: Vec<NeighbourRecord>,
}

#[derive(Serialize)]
struct UnblockRequest {
    node: String,
}

#[derive(Deserialize)]
struct UnblockResponse {
    removed: NeighbourRecord,
}

pub async fn cmd_blocklist(port: u16) -> Result<()> {
    let resp: BlocklistResponse = get_json(&format!("{}/blocklist", base_url(port))).await?;

    if resp.blocklisted.is_empty() {
        println!("Blocklist is empty.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Blocklist ({})", resp.blocklisted.len());
    println!("═══════════════════════════════════════");

    for n in &resp.blocklisted {
        println!("  ✗ {}:{} — {} ({})", n.ip, n.port, n.function, short_key(&n.public_key));
    }

    Ok(())
}

pub async fn cmd_unblock(port: u16, node: &str) -> Result<()> {
    let req = UnblockRequest {
        node: node.to_string(),
    };
    let resp: UnblockResponse =
        post_json_body(&format!("{}/blocklist/remove", base_url(port)), &req).await?;
    println!("✓ Removed {}:{} from the blocklist", resp.removed.ip, resp.removed.port);
    Ok(())
}
