//! Node status, neighbours, constellation view and discovery listing.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    node: String,
    name: String,
    function: String,
    public_key: String,
    neighbours: usize,
    blocklisted: usize,
    known: usize,
    pending: usize,
    view_entries: usize,
    routes: usize,
    rebuilds: u64,
    gossip_phase: String,
}

#[derive(Deserialize)]
pub(crate) struct NeighbourRecord {
    pub ip: String,
    pub port: u16,
    pub function: String,
    pub public_key: String,
    pub last_contact: u64,
}

#[derive(Deserialize)]
struct NeighboursResponse {
    neighbours: Vec<NeighbourRecord>,
}

#[derive(Deserialize)]
struct ConstellationEntry {
    freshness: u64,
    neighbours: BTreeMap<String, NeighbourRecord>,
}

#[derive(Deserialize)]
struct DiscoveredNode {
    ip: String,
    port: u16,
    function: String,
}

#[derive(Deserialize)]
struct DiscoveryResponse {
    known: Vec<DiscoveredNode>,
    pending: Vec<DiscoveredNode>,
}

pub(crate) fn short_key(key: &str) -> &str {
    key.get(..16).unwrap_or(key)
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Constellation Node Status");
    println!("═══════════════════════════════════════");
    println!("  Node          : {}", resp.node);
    println!("  Name          : {}", resp.name);
    println!("  Function      : {}", resp.function);
    println!("  Public key    : {}", short_key(&resp.public_key));
    println!("  Neighbours    : {}", resp.neighbours);
    println!("  Blocklisted   : {}", resp.blocklisted);
    println!("  Known         : {} ({} pending)", resp.known, resp.pending);
    println!("  View entries  : {}", resp.view_entries);
    println!("  Routes        : {} ({} rebuilds)", resp.routes, resp.rebuilds);
    println!("  Gossip phase  : {}", resp.gossip_phase);

    Ok(())
}

pub async fn cmd_neighbours(port: u16) -> Result<()> {
    let resp: NeighboursResponse = get_json(&format!("{}/neighbours", base_url(port))).await?;

    if resp.neighbours.is_empty() {
        println!("No neighbours yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Neighbours ({})", resp.neighbours.len());
    println!("═══════════════════════════════════════");

    for n in &resp.neighbours {
        println!("  ┌─ {}:{}", n.ip, n.port);
        println!("  │  function     : {}", n.function);
        println!("  │  public key   : {}", short_key(&n.public_key));
        println!("  └─ last contact : {}", n.last_contact);
    }

    Ok(())
}

pub async fn cmd_constellation(port: u16) -> Result<()> {
    let resp: BTreeMap<String, ConstellationEntry> =
        get_json(&format!("{}/constellation", base_url(port))).await?;

    if resp.is_empty() {
        println!("Constellation view is empty.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Constellation View ({} nodes)", resp.len());
    println!("═══════════════════════════════════════");

    for (node, entry) in &resp {
        let neighbours: Vec<&str> = entry.neighbours.keys().map(String::as_str).collect();
        println!("  {} (freshness {})", node, entry.freshness);
        println!("    → {}", neighbours.join(", "));
    }

    Ok(())
}

pub async fn cmd_discovery(port: u16) -> Result<()> {
    let resp: DiscoveryResponse = get_json(&format!("{}/discovery", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Discovery ({} known, {} pending)", resp.known.len(), resp.pending.len());
    println!("═══════════════════════════════════════");

    for d in &resp.known {
        println!("  ✓ {}:{} — {}", d.ip, d.port, d.function);
    }
    for d in &resp.pending {
        println!("  … {}:{} — {}", d.ip, d.port, d.function);
    }

    Ok(())
}
