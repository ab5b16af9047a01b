//! Node identity and the replicated topology data model.
//!
//! A node is addressed by `(ip, port)` with canonical string form `"ip:port"`.
//! `NodeId` serializes as that string so it can key JSON maps directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unix time in milliseconds. Used for `freshness` and `last_contact`.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── NodeId ────────────────────────────────────────────────────────────────────

/// Globally unique node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub ip: String,
    pub port: u16,
}

impl NodeId {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id {0:?}: expected \"ip:port\"")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseNodeIdError(s.to_string()))?;
        if ip.is_empty() {
            return Err(ParseNodeIdError(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ParseNodeIdError(s.to_string()))?;
        Ok(Self::new(ip, port))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── NeighborRecord ────────────────────────────────────────────────────────────

/// An established neighbour, as held in a node's NeighborStore and as
/// reported inside gossiped constellation entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub ip: String,
    pub port: u16,
    /// Capability tag, e.g. "whale-tracking".
    pub function: String,
    /// Carried, never verified.
    pub public_key: String,
    /// Unix ms of the last successful exchange.
    #[serde(alias = "last_contacted")]
    pub last_contact: u64,
}

impl NeighborRecord {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.ip.clone(), self.port)
    }
}

// ── ConstellationEntry ────────────────────────────────────────────────────────

/// One node's self-reported neighbour view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstellationEntry {
    pub freshness: u64,
    pub neighbours: BTreeMap<NodeId, NeighborRecord>,
}

impl ConstellationEntry {
    /// True when both entries name exactly the same neighbour ids.
    /// Record contents (notably `last_contact`) are not compared.
    pub fn same_neighbour_set(&self, other: &ConstellationEntry) -> bool {
        self.neighbours.len() == other.neighbours.len()
            && self.neighbours.keys().eq(other.neighbours.keys())
    }
}

/// The full constellation view, as exchanged in heartbeats.
pub type ConstellationSnapshot = BTreeMap<NodeId, ConstellationEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ip: &str, port: u16, last_contact: u64) -> NeighborRecord {
        NeighborRecord {
            ip: ip.to_string(),
            port,
            function: "whale-tracking".to_string(),
            public_key: "ab".repeat(32),
            last_contact,
        }
    }

    #[test]
    fn node_id_parses_and_displays() {
        let id: NodeId = "10.35.70.1:33001".parse().unwrap();
        assert_eq!(id.ip, "10.35.70.1");
        assert_eq!(id.port, 33001);
        assert_eq!(id.to_string(), "10.35.70.1:33001");
    }

    #[test]
    fn node_id_rejects_garbage() {
        assert!("no-port".parse::<NodeId>().is_err());
        assert!(":33001".parse::<NodeId>().is_err());
        assert!("host:99999".parse::<NodeId>().is_err());
    }

    #[test]
    fn node_id_keys_json_maps() {
        let mut map = BTreeMap::new();
        map.insert(NodeId::new("127.0.0.1", 33002), 7u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"127.0.0.1:33002":7}"#);
        let back: BTreeMap<NodeId, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn neighbour_set_ignores_contact_times() {
        let a = NodeId::new("127.0.0.1", 1);
        let mut left = ConstellationEntry {
            freshness: 1,
            neighbours: BTreeMap::new(),
        };
        left.neighbours.insert(a.clone(), record("127.0.0.1", 1, 10));
        let mut right = left.clone();
        right.freshness = 2;
        right.neighbours.insert(a, record("127.0.0.1", 1, 99));
        assert!(left.same_neighbour_set(&right));

        right
            .neighbours
            .insert(NodeId::new("127.0.0.1", 2), record("127.0.0.1", 2, 5));
        assert!(!left.same_neighbour_set(&right));
    }

    #[test]
    fn record_accepts_legacy_field_name() {
        let json = r#"{"ip":"1.2.3.4","port":5,"function":"basestation","public_key":"","last_contacted":42}"#;
        let rec: NeighborRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.last_contact, 42);
        assert_eq!(rec.node_id(), NodeId::new("1.2.3.4", 5));
    }
}
