//! Churn — controlled eviction and promotion of neighbours.
//!
//! Each tick may evict one random neighbour into the blocklist (only while
//! more than `min_neighbours` remain) and then promotes the head of the
//! pending-discovery queue via a handshake. Eviction is local only: the
//! evicted peer ages us out through its own liveness window.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use constellation_core::config::ChurnConfig;
use constellation_core::NodeId;

use crate::discovery::DiscoveryPool;
use crate::handshake::{HandshakeOutcome, HandshakeProtocol};
use crate::neighbor::{Blocklist, NeighborStore};

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChurnReport {
    pub evicted: Option<NodeId>,
    pub promoted: Option<NodeId>,
    /// Pending candidate that was popped but did not become a neighbour.
    pub promotion_failed: Option<NodeId>,
}

pub struct ChurnManager {
    config: ChurnConfig,
    neighbours: NeighborStore,
    blocklist: Blocklist,
    pool: Arc<DiscoveryPool>,
    handshake: Arc<HandshakeProtocol>,
}

impl ChurnManager {
    pub fn new(
        config: ChurnConfig,
        neighbours: NeighborStore,
        blocklist: Blocklist,
        pool: Arc<DiscoveryPool>,
        handshake: Arc<HandshakeProtocol>,
    ) -> Self {
        Self {
            config,
            neighbours,
            blocklist,
            pool,
            handshake,
        }
    }

    /// Delay before the next tick, uniform in `[min, max]` seconds.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let lo = self.config.min_interval_secs;
        let hi = self.config.max_interval_secs.max(lo);
        Duration::from_secs(rng.gen_range(lo..=hi))
    }

    pub async fn tick<R: Rng + Send + ?Sized>(&self, rng: &mut R) -> ChurnReport {
        let mut report = ChurnReport::default();

        if self.neighbours.len() > self.config.min_neighbours {
            let ids = self.neighbours.ids();
            if let Some(victim) = ids.choose(rng) {
                if let Some(record) = self.neighbours.remove(victim) {
                    tracing::info!(peer = %victim, "churn evicted neighbour");
                    self.blocklist.block(record);
                    report.evicted = Some(victim.clone());
                }
            }
        }

        if let Some(candidate) = self.pool.pop_pending() {
            let id = candidate.node_id();
            match self.handshake.initiate(&id).await {
                Ok(HandshakeOutcome::Established(_)) => {
                    tracing::info!(peer = %id, "churn promoted pending candidate");
                    report.promoted = Some(id);
                }
                Ok(outcome) => {
                    tracing::debug!(peer = %id, ?outcome, "pending candidate not promoted");
                    report.promotion_failed = Some(id);
                }
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "pending candidate handshake failed");
                    report.promotion_failed = Some(id);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveredNode;
    use crate::handshake::LocalIdentity;
    use crate::store::MemoryStore;
    use crate::transport::testing::ScriptedTransport;
    use constellation_core::NeighborRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn id(port: u16) -> NodeId {
        NodeId::new("127.0.0.1", port)
    }

    fn record(port: u16) -> NeighborRecord {
        NeighborRecord {
            ip: "127.0.0.1".to_string(),
            port,
            function: "basestation".to_string(),
            public_key: format!("pk-{port}"),
            last_contact: 1,
        }
    }

    fn discovered(port: u16) -> DiscoveredNode {
        DiscoveredNode {
            ip: "127.0.0.1".to_string(),
            port,
            function: "basestation".to_string(),
            public_key: String::new(),
            discovered_at: 0,
        }
    }

    struct Fixture {
        churn: ChurnManager,
        neighbours: NeighborStore,
        blocklist: Blocklist,
        pool: Arc<DiscoveryPool>,
        transport: Arc<ScriptedTransport>,
    }

    fn fixture(min_neighbours: usize) -> Fixture {
        let store = MemoryStore::shared();
        let neighbours = NeighborStore::open(store.clone());
        let blocklist = Blocklist::open(store.clone());
        let pool = Arc::new(DiscoveryPool::open(store));
        let transport = Arc::new(ScriptedTransport::new());
        let handshake = Arc::new(HandshakeProtocol::new(
            LocalIdentity {
                id: id(1),
                name: "sat-1".to_string(),
                function: "disaster-imaging".to_string(),
                public_key: "pk-1".to_string(),
            },
            neighbours.clone(),
            blocklist.clone(),
            transport.clone(),
        ));
        let churn = ChurnManager::new(
            ChurnConfig {
                min_neighbours,
                ..ChurnConfig::default()
            },
            neighbours.clone(),
            blocklist.clone(),
            pool.clone(),
            handshake,
        );
        Fixture {
            churn,
            neighbours,
            blocklist,
            pool,
            transport,
        }
    }

    #[tokio::test]
    async fn evicts_into_blocklist_above_threshold() {
        let f = fixture(1);
        f.neighbours.insert_if_absent(record(2));
        f.neighbours.insert_if_absent(record(3));

        let report = f.churn.tick(&mut StdRng::seed_from_u64(7)).await;
        let victim = report.evicted.expect("one eviction");
        assert_eq!(f.neighbours.len(), 1);
        assert!(f.blocklist.contains(&victim));
        assert!(report.promoted.is_none());
    }

    #[tokio::test]
    async fn never_evicts_at_or_below_threshold() {
        let f = fixture(1);
        f.neighbours.insert_if_absent(record(2));
        let report = f.churn.tick(&mut StdRng::seed_from_u64(7)).await;
        assert!(report.evicted.is_none());
        assert_eq!(f.neighbours.len(), 1);
    }

    #[tokio::test]
    async fn promotes_pending_head() {
        let f = fixture(5);
        f.transport.peer_identity(&id(4), "whale-tracking", "pk-4");
        f.pool.absorb(vec![discovered(4)], 0.05, &mut StdRng::seed_from_u64(1));
        assert_eq!(f.pool.pending_len(), 1);

        let report = f.churn.tick(&mut StdRng::seed_from_u64(1)).await;
        assert_eq!(report.promoted, Some(id(4)));
        assert!(f.neighbours.contains(&id(4)));
        assert_eq!(f.pool.pending_len(), 0);
    }

    #[tokio::test]
    async fn evicted_node_cannot_come_back_through_promotion() {
        let f = fixture(0);
        f.neighbours.insert_if_absent(record(4));
        f.transport.peer_identity(&id(4), "basestation", "pk-4");
        f.pool.absorb(vec![discovered(4)], 0.05, &mut StdRng::seed_from_u64(1));

        let report = f.churn.tick(&mut StdRng::seed_from_u64(3)).await;
        assert_eq!(report.evicted, Some(id(4)));
        assert_eq!(report.promotion_failed, Some(id(4)));
        assert!(!f.neighbours.contains(&id(4)));
    }

    #[test]
    fn delay_stays_in_range() {
        let f = fixture(1);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let d = f.churn.next_delay(&mut rng).as_secs();
            assert!((20..=30).contains(&d));
        }
    }
}
