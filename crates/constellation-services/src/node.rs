//! NodeContext — every component of one node, wired once at startup.
//!
//! Cloning is cheap; handlers and periodic tasks each hold a clone. Several
//! contexts can live in one process, which is how the integration tests run
//! a whole constellation.

use std::sync::Arc;

use serde::Serialize;

use constellation_core::config::NodeConfig;
use constellation_core::message::{RouteRequest, RouteResponse};
use constellation_core::NodeId;

use crate::churn::ChurnManager;
use crate::discovery::DiscoveryPool;
use crate::gossip::{ConstellationView, Gossip, GossipPhase};
use crate::handshake::{HandshakeProtocol, LocalIdentity};
use crate::neighbor::{Blocklist, NeighborStore};
use crate::rebuild::RouteRebuilder;
use crate::relay::Relay;
use crate::routing::{
    FailureDetector, ForwardError, Forwarder, GeneratorConfig, RouteGenerator, RoutingTableStore,
};
use crate::store::SharedStore;
use crate::transport::PeerTransport;

#[derive(Clone)]
pub struct NodeContext {
    pub config: Arc<NodeConfig>,
    pub identity: Arc<LocalIdentity>,
    pub neighbours: NeighborStore,
    pub blocklist: Blocklist,
    pub pool: Arc<DiscoveryPool>,
    pub view: Arc<ConstellationView>,
    pub tables: Arc<RoutingTableStore>,
    pub rebuilder: Arc<RouteRebuilder>,
    pub handshake: Arc<HandshakeProtocol>,
    pub gossip: Arc<Gossip>,
    pub churn: Arc<ChurnManager>,
    pub relay: Arc<Relay>,
    pub forwarder: Forwarder,
    pub detector: Arc<dyn FailureDetector>,
    pub transport: Arc<dyn PeerTransport>,
}

/// Snapshot served by the operator status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub node: NodeId,
    pub name: String,
    pub function: String,
    pub public_key: String,
    pub neighbours: usize,
    pub blocklisted: usize,
    pub known: usize,
    pub pending: usize,
    pub view_entries: usize,
    pub routes: usize,
    pub rebuilds: u64,
    pub gossip_phase: String,
}

impl NodeContext {
    pub fn new(
        config: NodeConfig,
        public_key: String,
        store: SharedStore,
        transport: Arc<dyn PeerTransport>,
        detector: Arc<dyn FailureDetector>,
    ) -> Self {
        let id = config.node_id();
        let identity = LocalIdentity {
            id: id.clone(),
            name: config.device_name(),
            function: config.identity.function.clone(),
            public_key,
        };

        let neighbours = NeighborStore::open(store.clone());
        let blocklist = Blocklist::open(store.clone());
        let pool = Arc::new(DiscoveryPool::open(store.clone()));
        let view = Arc::new(ConstellationView::open(store.clone(), id.clone()));
        let tables = Arc::new(RoutingTableStore::open(store));

        let generator = RouteGenerator::new(GeneratorConfig {
            hop_bound: config.routing.hop_bound,
            local: Some((id.clone(), identity.function.clone())),
        });
        let rebuilder = Arc::new(RouteRebuilder::new(view.clone(), tables.clone(), generator));

        let handshake = Arc::new(HandshakeProtocol::new(
            identity.clone(),
            neighbours.clone(),
            blocklist.clone(),
            transport.clone(),
        ));
        let gossip = Arc::new(Gossip::new(
            view.clone(),
            neighbours.clone(),
            blocklist.clone(),
            transport.clone(),
            rebuilder.clone(),
            config.gossip.clone(),
            config.network.request_timeout(),
        ));
        let churn = Arc::new(ChurnManager::new(
            config.churn.clone(),
            neighbours.clone(),
            blocklist.clone(),
            pool.clone(),
            handshake.clone(),
        ));
        let relay = Arc::new(Relay::new(
            id,
            tables.clone(),
            transport.clone(),
            config.routing.relay_hop_ceiling,
            config.routing.max_alternate_attempts,
            config.network.request_timeout(),
        ));
        let forwarder = Forwarder {
            max_alternate_attempts: config.routing.max_alternate_attempts,
            max_route_attempts: config.routing.max_route_attempts,
        };

        Self {
            config: Arc::new(config),
            identity: Arc::new(identity),
            neighbours,
            blocklist,
            pool,
            view,
            tables,
            rebuilder,
            handshake,
            gossip,
            churn,
            relay,
            forwarder,
            detector,
            transport,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.identity.id
    }

    /// Select a route and simulate delivery along it.
    pub fn route(&self, request: &RouteRequest) -> Result<RouteResponse, ForwardError> {
        let table = self.tables.current();
        let priority = request.priority.unwrap_or_default();
        let forwarded = self.forwarder.forward(
            &table,
            &request.source,
            &request.destination,
            priority,
            self.detector.as_ref(),
        )?;

        let route = forwarded.selection.route;
        tracing::debug!(
            source = %request.source,
            destination = %request.destination,
            route_type = %route.route_type,
            attempts = forwarded.report.attempts,
            "route served"
        );
        Ok(RouteResponse {
            status: "success".to_string(),
            route_type: route.route_type,
            metrics: route.metrics.clone(),
            routing_table: table.from_source(&request.source).cloned().unwrap_or_default(),
            selected_route: route,
            delivery: forwarded.report,
        })
    }

    pub fn status(&self) -> NodeStatus {
        let phase = match self.gossip.phase() {
            GossipPhase::Idle => "idle",
            GossipPhase::Pushing => "pushing",
            GossipPhase::Merging => "merging",
        };
        NodeStatus {
            node: self.identity.id.clone(),
            name: self.identity.name.clone(),
            function: self.identity.function.clone(),
            public_key: self.identity.public_key.clone(),
            neighbours: self.neighbours.len(),
            blocklisted: self.blocklist.len(),
            known: self.pool.known().len(),
            pending: self.pool.pending_len(),
            view_entries: self.view.len(),
            routes: self.tables.current().route_count(),
            rebuilds: self.rebuilder.completed(),
            gossip_phase: phase.to_string(),
        }
    }
}
