//! Constellation integration test harness.
//!
//! Each test starts real nodes in-process: an axum server bound to an
//! ephemeral loopback port per node, talking to its peers over HTTP.
//! Nodes keep their state in memory and run no background tasks, so tests
//! drive handshakes, heartbeats and rebuilds explicitly.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use constellation_api::{ApiState, HttpTransport};
use constellation_core::config::NodeConfig;
use constellation_core::NodeId;
use constellation_services::routing::FailureDetector;
use constellation_services::store::MemoryStore;
use constellation_services::NodeContext;

mod gossip;
mod handshake;
mod operator;
mod relay;
mod routing;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Failure detector whose failing set can change while the node runs.
#[derive(Default)]
pub struct SwitchableFailures(Mutex<BTreeSet<NodeId>>);

impl SwitchableFailures {
    pub fn fail(&self, id: &NodeId) {
        self.0.lock().unwrap().insert(id.clone());
    }
}

impl FailureDetector for SwitchableFailures {
    fn hop_fails(&self, hop: &NodeId) -> bool {
        self.0.lock().unwrap().contains(hop)
    }
}

pub struct TestNode {
    pub node: NodeContext,
    pub failures: Arc<SwitchableFailures>,
    server: JoinHandle<Result<()>>,
}

impl TestNode {
    pub fn id(&self) -> NodeId {
        self.node.id().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.node.id(), path)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Start a node with the given function on an ephemeral loopback port.
pub async fn spawn_node(function: &str) -> TestNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = NodeConfig::default();
    config.network.ip = "127.0.0.1".to_string();
    config.network.port = port;
    config.network.request_timeout_ms = 2000;
    config.identity.function = function.to_string();
    config.storage.persist = false;
    config.churn.enabled = false;

    let transport = Arc::new(HttpTransport::new(config.node_id(), &config.network).unwrap());
    let failures = Arc::new(SwitchableFailures::default());
    let node = NodeContext::new(
        config,
        format!("{:064x}", port),
        MemoryStore::shared(),
        transport,
        failures.clone(),
    );

    let server = tokio::spawn(constellation_api::serve_listener(
        ApiState::new(node.clone()),
        listener,
    ));

    TestNode {
        node,
        failures,
        server,
    }
}

/// Three nodes in a line: `a - b - c`. Views are fully gossiped and every
/// node has a fresh routing table.
pub async fn chain() -> (TestNode, TestNode, TestNode) {
    let a = spawn_node("disaster-imaging").await;
    let b = spawn_node("whale-tracking").await;
    let c = spawn_node("windfarm-monitoring").await;

    a.node.handshake.initiate(&b.id()).await.unwrap();
    b.node.handshake.initiate(&c.id()).await.unwrap();

    b.node.gossip.push_cycle().await;
    a.node.gossip.push_cycle().await;
    c.node.gossip.push_cycle().await;
    b.node.gossip.push_cycle().await;

    for n in [&a, &b, &c] {
        n.node.rebuilder.rebuild_now().unwrap();
    }
    (a, b, c)
}

pub async fn get_json(url: &str) -> Result<(u16, Value)> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = response.status().as_u16();
    Ok((status, response.json().await.context("response is not JSON")?))
}

pub async fn post_json(url: &str, body: &Value) -> Result<(u16, Value)> {
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let status = response.status().as_u16();
    Ok((status, response.json().await.context("response is not JSON")?))
}
