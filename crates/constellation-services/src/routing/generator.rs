//! Routing-table construction from the constellation view.
//!
//! For every ordered `(source, destination)` pair, four strategies are tried
//! and every success is kept:
//!
//! - DIRECT: destination is a reported neighbour of source. Score 100.
//! - FUNCTION_BASED: greedy walk scored by [`FunctionScorer`].
//! - LOAD_BALANCED: greedy walk scored by [`LoadScorer`]; load is the number
//!   of hops already assigned to a node earlier in this build pass.
//! - RANDOM: uniform random walk. Score 50.
//!
//! Multi-hop walks never revisit a node, never include the source, and are
//! abandoned once the path exceeds the hop bound. A pair with no route is
//! simply absent from the table.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::Rng;

use constellation_core::route::sort_routes;
use constellation_core::{ConstellationSnapshot, NodeId, Route, RouteType, RoutingTable};

use super::scoring::{FunctionScorer, HopContext, HopScore, HopScorer, LoadScorer, TopologyGraph};
use super::RoutingError;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub hop_bound: usize,
    /// The local node and its function.
    pub local: Option<(NodeId, String)>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            hop_bound: 3,
            local: None,
        }
    }
}

pub struct RouteGenerator {
    config: GeneratorConfig,
    function_scorer: Box<dyn HopScorer>,
    load_scorer: Box<dyn HopScorer>,
}

impl RouteGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_scorers(config, Box::new(FunctionScorer), Box::new(LoadScorer))
    }

    /// Swap in different greedy scoring functions.
    pub fn with_scorers(
        config: GeneratorConfig,
        function_scorer: Box<dyn HopScorer>,
        load_scorer: Box<dyn HopScorer>,
    ) -> Self {
        Self {
            config,
            function_scorer,
            load_scorer,
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        view: &ConstellationSnapshot,
        rng: &mut R,
    ) -> Result<RoutingTable, RoutingError> {
        if view.is_empty() {
            return Err(RoutingError::EmptyConstellation);
        }
        let local = self
            .config
            .local
            .as_ref()
            .map(|(id, function)| (id, function.as_str()));
        let graph = TopologyGraph::from_view(view, local);

        let mut load: BTreeMap<NodeId, u32> = BTreeMap::new();
        let mut table = RoutingTable::default();

        for source in graph.sources() {
            let mut by_destination = BTreeMap::new();
            for destination in graph.nodes().filter(|d| *d != source) {
                let mut routes = Vec::with_capacity(4);
                if let Some(route) = direct_route(&graph, source, destination) {
                    routes.push(route);
                }
                if let Some(route) = self.greedy_walk(self.function_scorer.as_ref(), &graph, source, destination, &load, false) {
                    routes.push(route);
                }
                if let Some(route) = self.greedy_walk(self.load_scorer.as_ref(), &graph, source, destination, &load, true) {
                    routes.push(route);
                }
                if let Some(route) = self.random_walk(&graph, source, destination, rng) {
                    routes.push(route);
                }
                if routes.is_empty() {
                    continue;
                }
                for hop in routes.iter().flat_map(|r| r.path.iter()) {
                    *load.entry(hop.clone()).or_default() += 1;
                }
                sort_routes(&mut routes);
                by_destination.insert(destination.clone(), routes);
            }
            if !by_destination.is_empty() {
                table.sources.insert(source.clone(), by_destination);
            }
        }

        tracing::debug!(
            sources = table.sources.len(),
            routes = table.route_count(),
            "routing table generated"
        );
        Ok(table)
    }

    fn greedy_walk(
        &self,
        scorer: &dyn HopScorer,
        graph: &TopologyGraph,
        source: &NodeId,
        destination: &NodeId,
        pass_load: &BTreeMap<NodeId, u32>,
        count_own_hops: bool,
    ) -> Option<Route> {
        let mut walk_load = pass_load.clone();
        let mut path: Vec<NodeId> = Vec::new();
        let mut visited: BTreeSet<NodeId> = BTreeSet::from([source.clone()]);
        let mut metrics: BTreeMap<String, f64> = BTreeMap::new();
        let mut current = source.clone();

        while current != *destination {
            let ctx = HopContext {
                graph,
                source,
                destination,
                current: &current,
                load: &walk_load,
            };
            let mut best: Option<(&NodeId, HopScore)> = None;
            for candidate in graph.neighbours(&current).filter(|c| !visited.contains(*c)) {
                let score = scorer.score(&ctx, candidate);
                if best.as_ref().map_or(true, |(_, b)| score.total > b.total) {
                    best = Some((candidate, score));
                }
            }
            let (next, hop) = best?;
            for (name, value) in hop.metrics {
                *metrics.entry(name.to_string()).or_default() += value;
            }

            let next = next.clone();
            if count_own_hops {
                *walk_load.entry(next.clone()).or_default() += 1;
            }
            visited.insert(next.clone());
            path.push(next.clone());
            current = next;

            if path.len() > self.config.hop_bound {
                return None;
            }
        }

        let score = metrics.values().sum::<f64>() / path.len() as f64;
        Some(Route {
            path,
            route_type: scorer.route_type(),
            score,
            metrics,
        })
    }

    fn random_walk<R: Rng + ?Sized>(
        &self,
        graph: &TopologyGraph,
        source: &NodeId,
        destination: &NodeId,
        rng: &mut R,
    ) -> Option<Route> {
        let randomness = rng.gen::<f64>() * 100.0;
        let mut path: Vec<NodeId> = Vec::new();
        let mut visited: BTreeSet<NodeId> = BTreeSet::from([source.clone()]);
        let mut current = source.clone();

        while current != *destination {
            let candidates: Vec<&NodeId> = graph
                .neighbours(&current)
                .filter(|c| !visited.contains(*c))
                .collect();
            let next = (*candidates.choose(rng)?).clone();
            visited.insert(next.clone());
            path.push(next.clone());
            current = next;

            if path.len() > self.config.hop_bound {
                return None;
            }
        }

        Some(Route {
            path,
            route_type: RouteType::Random,
            score: 50.0,
            metrics: BTreeMap::from([("randomness".to_string(), randomness)]),
        })
    }
}

fn direct_route(graph: &TopologyGraph, source: &NodeId, destination: &NodeId) -> Option<Route> {
    if !graph.is_neighbour(source, destination) {
        return None;
    }
    Some(Route {
        path: vec![destination.clone()],
        route_type: RouteType::Direct,
        score: 100.0,
        metrics: BTreeMap::from([
            ("hops".to_string(), 1.0),
            ("function_match".to_string(), 1.0),
            ("load".to_string(), 0.0),
        ]),
    })
}
