//! Topology graph and per-hop scoring functions for the greedy strategies.
//!
//! A scorer rates one candidate next hop given where the walk currently is.
//! Strategies differ only in the scorer they plug into the same walk.

use std::collections::{BTreeMap, BTreeSet};

use constellation_core::{ConstellationSnapshot, NodeId, RouteType};

// ── TopologyGraph ─────────────────────────────────────────────────────────────

/// Directed adjacency as self-reported in the constellation view.
#[derive(Debug, Default, Clone)]
pub struct TopologyGraph {
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
    freshness: BTreeMap<NodeId, u64>,
    functions: BTreeMap<NodeId, String>,
    nodes: BTreeSet<NodeId>,
}

impl TopologyGraph {
    /// Build from a view. A node's function is taken from any record that
    /// describes it; `local` supplies the local node's own function, which no
    /// record in its own entry carries.
    pub fn from_view(view: &ConstellationSnapshot, local: Option<(&NodeId, &str)>) -> Self {
        let mut graph = TopologyGraph::default();
        for (id, entry) in view {
            graph.nodes.insert(id.clone());
            graph.freshness.insert(id.clone(), entry.freshness);
            let adjacent = graph.adjacency.entry(id.clone()).or_default();
            for (neighbour, record) in &entry.neighbours {
                if neighbour == id {
                    continue;
                }
                adjacent.insert(neighbour.clone());
                graph.nodes.insert(neighbour.clone());
                graph
                    .functions
                    .entry(neighbour.clone())
                    .or_insert_with(|| record.function.clone());
            }
        }
        if let Some((id, function)) = local {
            graph.functions.insert(id.clone(), function.to_string());
        }
        graph
    }

    /// Nodes that reported a neighbour set.
    pub fn sources(&self) -> impl Iterator<Item = &NodeId> {
        self.adjacency.keys()
    }

    /// Every node named anywhere in the view.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn neighbours(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.adjacency.get(id).into_iter().flatten()
    }

    pub fn is_neighbour(&self, of: &NodeId, candidate: &NodeId) -> bool {
        self.adjacency
            .get(of)
            .map(|set| set.contains(candidate))
            .unwrap_or(false)
    }

    pub fn degree(&self, id: &NodeId) -> usize {
        self.adjacency.get(id).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn freshness(&self, id: &NodeId) -> Option<u64> {
        self.freshness.get(id).copied()
    }

    pub fn function(&self, id: &NodeId) -> Option<&str> {
        self.functions.get(id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ── Scorer interface ──────────────────────────────────────────────────────────

/// Where a walk is when a candidate is scored.
pub struct HopContext<'a> {
    pub graph: &'a TopologyGraph,
    pub source: &'a NodeId,
    pub destination: &'a NodeId,
    pub current: &'a NodeId,
    /// Hops already assigned to each node in this build pass.
    pub load: &'a BTreeMap<NodeId, u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopScore {
    pub total: f64,
    pub metrics: Vec<(&'static str, f64)>,
}

impl HopScore {
    pub fn from_parts(metrics: Vec<(&'static str, f64)>) -> Self {
        let total = metrics.iter().map(|(_, v)| v).sum();
        Self { total, metrics }
    }
}

pub trait HopScorer: Send + Sync {
    fn route_type(&self) -> RouteType;
    fn score(&self, ctx: &HopContext<'_>, candidate: &NodeId) -> HopScore;
}

/// 30 points for identical freshness, decaying with the gap in seconds.
fn freshness_score(graph: &TopologyGraph, a: &NodeId, b: &NodeId) -> f64 {
    match (graph.freshness(a), graph.freshness(b)) {
        (Some(fa), Some(fb)) => {
            let gap = fa.abs_diff(fb) as f64;
            30.0 / (1.0 + gap / 1000.0)
        }
        _ => 0.0,
    }
}

fn proximity_score(ctx: &HopContext<'_>, candidate: &NodeId) -> f64 {
    if ctx.graph.is_neighbour(candidate, ctx.destination) {
        40.0
    } else {
        0.0
    }
}

// ── FunctionScorer ────────────────────────────────────────────────────────────

/// Prefers hops sharing the source's function.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionScorer;

impl HopScorer for FunctionScorer {
    fn route_type(&self) -> RouteType {
        RouteType::FunctionBased
    }

    fn score(&self, ctx: &HopContext<'_>, candidate: &NodeId) -> HopScore {
        let same_function = match (ctx.graph.function(candidate), ctx.graph.function(ctx.source)) {
            (Some(c), Some(s)) => c == s,
            _ => false,
        };
        HopScore::from_parts(vec![
            ("function_match", if same_function { 100.0 } else { 0.0 }),
            (
                "neighbor_bonus",
                if ctx.graph.is_neighbour(ctx.current, candidate) { 50.0 } else { 0.0 },
            ),
            ("freshness", freshness_score(ctx.graph, candidate, ctx.current)),
            ("dest_proximity", proximity_score(ctx, candidate)),
        ])
    }
}

// ── LoadScorer ────────────────────────────────────────────────────────────────

/// Prefers lightly loaded hops with spare connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadScorer;

impl HopScorer for LoadScorer {
    fn route_type(&self) -> RouteType {
        RouteType::LoadBalanced
    }

    fn score(&self, ctx: &HopContext<'_>, candidate: &NodeId) -> HopScore {
        let load = ctx.load.get(candidate).copied().unwrap_or(0) as f64;
        let degree = ctx.graph.degree(candidate) as f64;
        let capacity = if degree > 0.0 {
            20.0 * (degree - load) / degree
        } else {
            0.0
        };
        HopScore::from_parts(vec![
            ("load_balance", 100.0 / (1.0 + load)),
            ("freshness", freshness_score(ctx.graph, candidate, ctx.current)),
            ("capacity", capacity),
            ("dest_proximity", proximity_score(ctx, candidate)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_core::{ConstellationEntry, NeighborRecord};

    fn id(port: u16) -> NodeId {
        NodeId::new("127.0.0.1", port)
    }

    fn entry(freshness: u64, neighbours: &[(u16, &str)]) -> ConstellationEntry {
        ConstellationEntry {
            freshness,
            neighbours: neighbours
                .iter()
                .map(|(port, function)| {
                    (
                        id(*port),
                        NeighborRecord {
                            ip: "127.0.0.1".to_string(),
                            port: *port,
                            function: function.to_string(),
                            public_key: String::new(),
                            last_contact: 0,
                        },
                    )
                })
                .collect(),
        }
    }

    fn view() -> ConstellationSnapshot {
        let mut view = ConstellationSnapshot::new();
        view.insert(id(1), entry(10_000, &[(2, "whale-tracking"), (3, "basestation")]));
        view.insert(id(2), entry(10_000, &[(1, "whale-tracking"), (4, "basestation")]));
        view.insert(id(3), entry(14_000, &[(1, "whale-tracking")]));
        view
    }

    #[test]
    fn graph_collects_functions_and_neighbour_only_nodes() {
        let graph = TopologyGraph::from_view(&view(), None);
        assert_eq!(graph.function(&id(2)), Some("whale-tracking"));
        assert_eq!(graph.function(&id(4)), Some("basestation"));
        assert_eq!(graph.nodes().count(), 4);
        assert_eq!(graph.sources().count(), 3);
        assert_eq!(graph.degree(&id(4)), 0);
        assert!(graph.freshness(&id(4)).is_none());
    }

    #[test]
    fn function_scorer_weights() {
        let graph = TopologyGraph::from_view(&view(), None);
        let load = BTreeMap::new();
        let ctx = HopContext {
            graph: &graph,
            source: &id(1),
            destination: &id(4),
            current: &id(1),
            load: &load,
        };
        // 2 shares node 1's function, is adjacent, equally fresh and reaches 4
        let two = FunctionScorer.score(&ctx, &id(2));
        assert_eq!(two.total, 100.0 + 50.0 + 30.0 + 40.0);
        // 3 is a different function, 4s staler and does not reach 4
        let three = FunctionScorer.score(&ctx, &id(3));
        assert!((three.total - (50.0 + 30.0 / 5.0)).abs() < 1e-9);
    }

    #[test]
    fn load_scorer_penalises_busy_hops() {
        let graph = TopologyGraph::from_view(&view(), None);
        let mut load = BTreeMap::new();
        let idle = {
            let ctx = HopContext {
                graph: &graph,
                source: &id(1),
                destination: &id(4),
                current: &id(1),
                load: &load,
            };
            LoadScorer.score(&ctx, &id(2)).total
        };
        load.insert(id(2), 1);
        let ctx = HopContext {
            graph: &graph,
            source: &id(1),
            destination: &id(4),
            current: &id(1),
            load: &load,
        };
        let busy = LoadScorer.score(&ctx, &id(2)).total;
        assert_eq!(idle, 100.0 + 30.0 + 20.0 + 40.0);
        assert_eq!(busy, 50.0 + 30.0 + 10.0 + 40.0);
    }
}
