//! Peer protocol payloads.
//!
//! JSON bodies exchanged between nodes over the peer endpoints. Required
//! handshake fields are `Option` so the acceptor can reject a missing field
//! with a structured error instead of a generic decode failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::node::{ConstellationSnapshot, NodeId};
use crate::route::{Route, RouteType, RoutesFrom};

// ── Handshake ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeRequest {
    #[serde(default)]
    pub device_name: String,
    pub device_function: Option<String>,
    pub public_key: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub connected_nodes: Vec<NodeId>,
}

/// What the acceptor did with the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptOutcome {
    #[default]
    Added,
    AlreadyNeighbour,
    Blocked,
}

/// The responder's identity, plus what it did with the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub device_name: String,
    pub device_function: String,
    pub public_key: String,
    pub port: u16,
    #[serde(default)]
    pub connected_nodes: Vec<NodeId>,
    #[serde(default)]
    pub outcome: AcceptOutcome,
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatPush {
    pub constellation: ConstellationSnapshot,
    /// The pushing node. Receivers refuse pushes from nodes they blocklisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    /// false when the receiver refused the push.
    pub ack: bool,
    /// Entries inserted or replaced by the merge.
    #[serde(default)]
    pub changed: usize,
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub source: NodeId,
    pub destination: NodeId,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// How a simulated walk along the selected route went.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub path_taken: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub status: String,
    pub selected_route: Route,
    pub route_type: RouteType,
    pub metrics: BTreeMap<String, f64>,
    /// All routes known from the request's source.
    pub routing_table: RoutesFrom,
    pub delivery: DeliveryReport,
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub source: NodeId,
    pub destination: NodeId,
    pub message: String,
    #[serde(default)]
    pub hops: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl ForwardRequest {
    /// BLAKE3 over source, destination and message, hex encoded.
    pub fn compute_message_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.destination.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.message.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardResponse {
    pub delivered: bool,
    pub message_id: String,
    /// Every node the message visited, destination last.
    pub hops: Vec<NodeId>,
}

// ── Identify / errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub status: String,
    /// The node's declared function.
    pub data: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub public_key: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub status_code: u16,
    pub error: String,
    /// Machine-readable rejection code, e.g. `LOOP_DETECTED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_nodes: Vec<NodeId>,
}

impl ErrorBody {
    pub fn new(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            status_code,
            error: error.into(),
            code: None,
            failed_nodes: Vec::new(),
        }
    }
}
