//! Store-and-forward relay.
//!
//! Each relayed message carries the list of nodes it has visited. A node
//! refuses a message it has already seen or one that has used up the hop
//! ceiling, delivers a message addressed to itself, and otherwise hands it to
//! the best next hop from its own routing table.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use constellation_core::message::{ForwardRequest, ForwardResponse, Priority};
use constellation_core::NodeId;

use crate::routing::{composite_score, ForwardError, RoutingTableStore};
use crate::transport::{PeerTransport, TransportError};

pub struct Relay {
    self_id: NodeId,
    tables: Arc<RoutingTableStore>,
    transport: Arc<dyn PeerTransport>,
    hop_ceiling: usize,
    max_next_hops: u32,
    request_timeout: Duration,
}

impl Relay {
    pub fn new(
        self_id: NodeId,
        tables: Arc<RoutingTableStore>,
        transport: Arc<dyn PeerTransport>,
        hop_ceiling: usize,
        max_next_hops: u32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            self_id,
            tables,
            transport,
            hop_ceiling,
            max_next_hops,
            request_timeout,
        }
    }

    /// Start relaying a new message from this node.
    pub async fn originate(
        &self,
        destination: NodeId,
        message: String,
    ) -> Result<ForwardResponse, ForwardError> {
        self.handle(ForwardRequest {
            source: self.self_id.clone(),
            destination,
            message,
            hops: Vec::new(),
            message_id: None,
        })
        .await
    }

    /// Handle a message arriving at this node.
    pub async fn handle(&self, mut request: ForwardRequest) -> Result<ForwardResponse, ForwardError> {
        let message_id = match &request.message_id {
            Some(id) => id.clone(),
            None => request.compute_message_id(),
        };
        request.message_id = Some(message_id.clone());

        if request.hops.contains(&self.self_id) {
            tracing::warn!(message_id = %message_id, "relay loop detected");
            return Err(ForwardError::LoopDetected {
                node: self.self_id.clone(),
            });
        }
        if request.hops.len() >= self.hop_ceiling {
            tracing::warn!(message_id = %message_id, hops = request.hops.len(), "relay hop limit exceeded");
            return Err(ForwardError::HopLimitExceeded {
                hops: request.hops.len(),
                ceiling: self.hop_ceiling,
            });
        }

        request.hops.push(self.self_id.clone());

        if request.destination == self.self_id {
            tracing::info!(
                message_id = %message_id,
                source = %request.source,
                hops = request.hops.len(),
                "message delivered"
            );
            return Ok(ForwardResponse {
                delivered: true,
                message_id,
                hops: request.hops,
            });
        }

        let next_hops = self.next_hops(&request.destination, &request.hops);
        if next_hops.is_empty() {
            return Err(ForwardError::NoRoute {
                from: self.self_id.clone(),
                destination: request.destination,
            });
        }

        let mut failed = Vec::new();
        for next in next_hops.into_iter().take(self.max_next_hops as usize) {
            tracing::debug!(message_id = %message_id, next = %next, "relaying");
            let sent = tokio::time::timeout(self.request_timeout, self.transport.forward(&next, &request))
                .await
                .unwrap_or_else(|_| Err(TransportError::Timeout { peer: next.clone() }));
            match sent {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(message_id = %message_id, next = %next, error = %e, "next hop refused");
                    failed.push(next);
                }
            }
        }

        Err(ForwardError::Undeliverable {
            destination: request.destination,
            failed_nodes: failed,
        })
    }

    /// Distinct first hops towards `destination`, best route first,
    /// excluding nodes the message has already visited.
    fn next_hops(&self, destination: &NodeId, visited: &[NodeId]) -> Vec<NodeId> {
        let table = self.tables.current();
        let mut routes: Vec<_> = table.routes(&self.self_id, destination).iter().collect();
        routes.sort_by(|a, b| {
            composite_score(b, Priority::Medium).total_cmp(&composite_score(a, Priority::Medium))
        });

        let mut seen = BTreeSet::new();
        routes
            .into_iter()
            .filter_map(|route| route.first_hop())
            .filter(|hop| !visited.contains(hop))
            .filter(|hop| seen.insert((*hop).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::testing::ScriptedTransport;
    use constellation_core::{Route, RouteType, RoutingTable};
    use std::collections::BTreeMap;

    fn id(port: u16) -> NodeId {
        NodeId::new("127.0.0.1", port)
    }

    fn route(route_type: RouteType, score: f64, path: &[u16]) -> Route {
        Route {
            path: path.iter().map(|p| id(*p)).collect(),
            route_type,
            score,
            metrics: BTreeMap::new(),
        }
    }

    fn relay(transport: Arc<ScriptedTransport>) -> Relay {
        let tables = Arc::new(RoutingTableStore::open(MemoryStore::shared()));
        let mut table = RoutingTable::default();
        table.sources.entry(id(1)).or_default().insert(
            id(9),
            vec![
                route(RouteType::FunctionBased, 200.0, &[3, 9]),
                route(RouteType::LoadBalanced, 150.0, &[4, 9]),
                route(RouteType::Random, 50.0, &[3, 5, 9]),
            ],
        );
        tables.replace(table);
        Relay::new(id(1), tables, transport, 4, 3, Duration::from_secs(1))
    }

    fn request(hops: &[u16]) -> ForwardRequest {
        ForwardRequest {
            source: id(7),
            destination: id(9),
            message: "flood at grid 12".to_string(),
            hops: hops.iter().map(|p| id(*p)).collect(),
            message_id: None,
        }
    }

    #[tokio::test]
    async fn loop_is_rejected() {
        let r = relay(Arc::new(ScriptedTransport::new()));
        let err = r.handle(request(&[7, 1])).await.unwrap_err();
        assert_eq!(err.code(), "LOOP_DETECTED");
    }

    #[tokio::test]
    async fn hop_ceiling_is_enforced() {
        let r = relay(Arc::new(ScriptedTransport::new()));
        let err = r.handle(request(&[7, 20, 21, 22])).await.unwrap_err();
        assert_eq!(err, ForwardError::HopLimitExceeded { hops: 4, ceiling: 4 });
    }

    #[tokio::test]
    async fn destination_acknowledges_with_full_hop_list() {
        let transport = Arc::new(ScriptedTransport::new());
        let tables = Arc::new(RoutingTableStore::open(MemoryStore::shared()));
        let r = Relay::new(id(9), tables, transport, 16, 3, Duration::from_secs(1));
        let out = r.handle(request(&[7, 3])).await.unwrap();
        assert!(out.delivered);
        assert_eq!(out.hops, vec![id(7), id(3), id(9)]);
        assert_eq!(out.message_id, request(&[]).compute_message_id());
    }

    #[tokio::test]
    async fn best_next_hop_is_tried_first() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.forward_sinks.lock().unwrap().insert(id(3));
        let r = relay(transport.clone());

        let out = r.handle(request(&[7])).await.unwrap();
        assert_eq!(out.hops, vec![id(7), id(1), id(3)]);
        let forwards = transport.forwards.lock().unwrap();
        assert_eq!(forwards.len(), 1);
        assert!(forwards[0].1.message_id.is_some());
    }

    #[tokio::test]
    async fn failed_next_hop_falls_back_and_skips_visited() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_unreachable(&id(3));
        transport.forward_sinks.lock().unwrap().insert(id(4));
        let r = relay(transport.clone());

        let out = r.handle(request(&[7])).await.unwrap();
        assert_eq!(out.hops.last(), Some(&id(4)));

        // 4 already visited: only 3 remains and it is down
        let err = r.handle(request(&[4])).await.unwrap_err();
        assert_eq!(
            err,
            ForwardError::Undeliverable {
                destination: id(9),
                failed_nodes: vec![id(3)],
            }
        );
    }
}
