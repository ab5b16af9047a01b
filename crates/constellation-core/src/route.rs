//! Route and routing-table data model shared by the engine and the HTTP surface.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Route generation strategy, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteType {
    Direct,
    FunctionBased,
    LoadBalanced,
    Random,
}

impl RouteType {
    pub const ALL: [RouteType; 4] = [
        RouteType::Direct,
        RouteType::FunctionBased,
        RouteType::LoadBalanced,
        RouteType::Random,
    ];

    /// 0 is the most preferred.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Multiplier applied by the selector on top of the priority weight.
    pub fn base_weight(self) -> f64 {
        match self {
            RouteType::Direct => 10.0,
            RouteType::FunctionBased => 3.0,
            RouteType::LoadBalanced => 2.0,
            RouteType::Random => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteType::Direct => "DIRECT",
            RouteType::FunctionBased => "FUNCTION_BASED",
            RouteType::LoadBalanced => "LOAD_BALANCED",
            RouteType::Random => "RANDOM",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A path from an implicit source. `path` excludes the source and ends at
/// the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: Vec<NodeId>,
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub score: f64,
    pub metrics: BTreeMap<String, f64>,
}

impl Route {
    pub fn first_hop(&self) -> Option<&NodeId> {
        self.path.first()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.path.contains(id)
    }
}

/// Routes from one source: destination → routes sorted best first.
pub type RoutesFrom = BTreeMap<NodeId, Vec<Route>>;

/// source → destination → routes, each list sorted by (type rank, score desc).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    pub sources: BTreeMap<NodeId, RoutesFrom>,
}

impl RoutingTable {
    pub fn routes(&self, source: &NodeId, destination: &NodeId) -> &[Route] {
        self.sources
            .get(source)
            .and_then(|by_dest| by_dest.get(destination))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn from_source(&self, source: &NodeId) -> Option<&RoutesFrom> {
        self.sources.get(source)
    }

    /// Total number of routes across all pairs.
    pub fn route_count(&self) -> usize {
        self.sources
            .values()
            .flat_map(|by_dest| by_dest.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Order routes by type priority, then by descending score.
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(|a, b| {
        a.route_type
            .rank()
            .cmp(&b.route_type.rank())
            .then_with(|| b.score.total_cmp(&a.score))
    });
}
