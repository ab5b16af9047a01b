//! Failure-aware forwarding over the routing table.
//!
//! The selected route is walked hop by hop. A hop reported as failed by the
//! [`FailureDetector`] joins the failed set and an alternate route is sought
//! from the last node reached, avoiding every failed node and every node
//! already on the path. When alternates run out the whole route is retried
//! from the source, still avoiding the failed set, up to a bound.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use constellation_core::message::{DeliveryReport, Priority};
use constellation_core::{NodeId, RoutingTable};

use super::selector::{select, select_excluding, Selection};

// ── Failure detection ─────────────────────────────────────────────────────────

/// Decides whether transmission to a hop fails.
pub trait FailureDetector: Send + Sync {
    fn hop_fails(&self, hop: &NodeId) -> bool;
}

/// Each hop fails independently with probability `p`.
pub struct RandomFailure {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomFailure {
    pub fn new(probability: f64) -> Self {
        Self::with_rng(probability, StdRng::from_entropy())
    }

    pub fn with_rng(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl FailureDetector for RandomFailure {
    fn hop_fails(&self, _hop: &NodeId) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen::<f64>() < self.probability
    }
}

/// A fixed set of nodes that always fail.
#[derive(Debug, Default, Clone)]
pub struct StaticFailures(pub BTreeSet<NodeId>);

impl FailureDetector for StaticFailures {
    fn hop_fails(&self, hop: &NodeId) -> bool {
        self.0.contains(hop)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    #[error("no route found from {from} to {destination}")]
    NoRoute { from: NodeId, destination: NodeId },

    #[error("all routes exhausted after {attempts} attempts")]
    Exhausted {
        failed_nodes: Vec<NodeId>,
        attempts: u32,
    },

    #[error("{node} already relayed this message")]
    LoopDetected { node: NodeId },

    #[error("hop limit exceeded ({hops} >= {ceiling})")]
    HopLimitExceeded { hops: usize, ceiling: usize },

    #[error("no next hop towards {destination} accepted the message")]
    Undeliverable {
        destination: NodeId,
        failed_nodes: Vec<NodeId>,
    },
}

impl ForwardError {
    /// Machine-readable tag carried in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            ForwardError::NoRoute { .. } => "NO_ROUTE",
            ForwardError::Exhausted { .. } => "ALL_ROUTES_EXHAUSTED",
            ForwardError::LoopDetected { .. } => "LOOP_DETECTED",
            ForwardError::HopLimitExceeded { .. } => "HOP_LIMIT_EXCEEDED",
            ForwardError::Undeliverable { .. } => "UNDELIVERABLE",
        }
    }

    pub fn failed_nodes(&self) -> &[NodeId] {
        match self {
            ForwardError::Exhausted { failed_nodes, .. }
            | ForwardError::Undeliverable { failed_nodes, .. } => failed_nodes,
            _ => &[],
        }
    }
}

// ── Forwarder ─────────────────────────────────────────────────────────────────

/// Outcome of a successful forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    /// The route initially chosen by the selector.
    pub selection: Selection,
    pub report: DeliveryReport,
}

#[derive(Debug, Clone, Copy)]
pub struct Forwarder {
    /// Alternate-route substitutions allowed at one hop position.
    pub max_alternate_attempts: u32,
    /// Whole-route attempts from the source.
    pub max_route_attempts: u32,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self {
            max_alternate_attempts: 3,
            max_route_attempts: 3,
        }
    }
}

impl Forwarder {
    pub fn forward(
        &self,
        table: &RoutingTable,
        source: &NodeId,
        destination: &NodeId,
        priority: Priority,
        detector: &dyn FailureDetector,
    ) -> Result<Forwarded, ForwardError> {
        let candidates = table.routes(source, destination);
        let selection = select(candidates, priority).ok_or_else(|| ForwardError::NoRoute {
            from: source.clone(),
            destination: destination.clone(),
        })?;

        let mut failed: BTreeSet<NodeId> = BTreeSet::new();
        let mut attempts = 0u32;

        'routes: for _ in 0..self.max_route_attempts {
            let Some(chosen) = select_excluding(candidates, priority, &failed) else {
                break;
            };
            attempts += 1;

            let mut taken: Vec<NodeId> = Vec::new();
            let mut current = source.clone();
            let mut remaining: VecDeque<NodeId> = chosen.route.path.into();
            let mut alternates = 0u32;

            while let Some(hop) = remaining.pop_front() {
                if !detector.hop_fails(&hop) {
                    tracing::trace!(hop = %hop, "hop ok");
                    taken.push(hop.clone());
                    current = hop;
                    alternates = 0;
                    continue;
                }

                tracing::debug!(hop = %hop, from = %current, "hop failed");
                failed.insert(hop);
                if alternates >= self.max_alternate_attempts {
                    continue 'routes;
                }
                alternates += 1;
                attempts += 1;

                let mut excluded = failed.clone();
                excluded.extend(taken.iter().cloned());
                excluded.insert(source.clone());
                match select_excluding(table.routes(&current, destination), priority, &excluded) {
                    Some(alternate) => remaining = alternate.route.path.into(),
                    None => continue 'routes,
                }
            }

            return Ok(Forwarded {
                selection,
                report: DeliveryReport {
                    delivered: true,
                    path_taken: taken,
                    failed_nodes: failed.into_iter().collect(),
                    attempts,
                },
            });
        }

        tracing::warn!(
            source = %source,
            destination = %destination,
            failed = failed.len(),
            attempts,
            "all routes exhausted"
        );
        Err(ForwardError::Exhausted {
            failed_nodes: failed.into_iter().collect(),
            attempts,
        })
    }
}
