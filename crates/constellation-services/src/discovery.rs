//! Active discovery of candidate satellites.
//!
//! A scan walks the configured candidate hosts. A host is scanned only if its
//! liveness check passes; then every port in range is asked for its function,
//! at most `concurrency` lookups at a time, and results are used as they
//! arrive. The scan stops as soon as `max_results` satellites are found.
//! Any failed lookup means "not a satellite" and is never retried within the
//! same scan.
//!
//! Results land in the [`DiscoveryPool`]: a small share is held back as
//! pending, to be promoted one at a time by churn.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use constellation_core::config::DiscoveryConfig;
use constellation_core::identity::is_known_function;
use constellation_core::message::IdentifyResponse;
use constellation_core::{now_ms, NodeId};

use crate::store::{keys, load_json, save_json, SharedStore};

/// Liveness and capability probes against raw host/port pairs.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn is_alive(&self, host: &str) -> bool;

    /// `None` on any failure: timeout, refusal, bad body.
    async fn identify(&self, host: &str, port: u16) -> Option<IdentifyResponse>;
}

/// A reachable node with a verified function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    pub ip: String,
    pub port: u16,
    pub function: String,
    #[serde(default)]
    pub public_key: String,
    pub discovered_at: u64,
}

impl DiscoveredNode {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.ip.clone(), self.port)
    }
}

fn canonical_host(host: &str) -> &str {
    if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1"
    } else {
        host
    }
}

// ── DiscoveryProbe ────────────────────────────────────────────────────────────

pub struct DiscoveryProbe {
    prober: Arc<dyn Prober>,
    config: DiscoveryConfig,
    self_id: NodeId,
}

impl DiscoveryProbe {
    pub fn new(prober: Arc<dyn Prober>, config: DiscoveryConfig, self_id: NodeId) -> Self {
        Self {
            prober,
            config,
            self_id,
        }
    }

    /// Run one scan. Returns at most `max_results` satellites.
    pub async fn scan(&self) -> Vec<DiscoveredNode> {
        let limit = self.config.max_results;
        let mut found = Vec::new();

        for host in &self.config.candidates {
            if found.len() >= limit {
                break;
            }
            let alive = tokio::time::timeout(self.config.probe_timeout(), self.prober.is_alive(host))
                .await
                .unwrap_or(false);
            if !alive {
                tracing::debug!(host, "candidate failed liveness probe");
                continue;
            }
            self.scan_host(host, limit, &mut found).await;
        }

        tracing::debug!(found = found.len(), "discovery scan complete");
        found
    }

    async fn scan_host(&self, host: &str, limit: usize, found: &mut Vec<DiscoveredNode>) {
        let ip = canonical_host(host).to_string();
        let own_host = canonical_host(&self.self_id.ip) == ip;
        let timeout = self.config.probe_timeout();
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let mut lookups = JoinSet::new();
        for port in self.config.min_port..=self.config.max_port {
            if own_host && port == self.self_id.port {
                continue;
            }
            let prober = self.prober.clone();
            let permits = permits.clone();
            let host = host.to_string();
            lookups.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (port, None);
                };
                let reply = tokio::time::timeout(timeout, prober.identify(&host, port))
                    .await
                    .ok()
                    .flatten();
                (port, reply)
            });
        }

        // Dropping the set aborts lookups still queued or in flight.
        while let Some(joined) = lookups.join_next().await {
            let (port, reply) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(host, error = %e, "identify task failed");
                    continue;
                }
            };
            let Some(reply) = reply else { continue };
            if !is_known_function(&reply.data) {
                tracing::trace!(host, port, function = %reply.data, "ignoring unknown function");
                continue;
            }
            tracing::debug!(host, port, function = %reply.data, "satellite found");
            found.push(DiscoveredNode {
                ip: ip.clone(),
                port,
                function: reply.data,
                public_key: reply.public_key,
                discovered_at: now_ms(),
            });
            if found.len() >= limit {
                break;
            }
        }
    }
}

// ── DiscoveryPool ─────────────────────────────────────────────────────────────

/// What [`DiscoveryPool::absorb`] did with a scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsorbReport {
    pub known: usize,
    pub queued: usize,
}

/// Known satellites (handshake candidates) and the pending queue.
pub struct DiscoveryPool {
    known: RwLock<BTreeMap<NodeId, DiscoveredNode>>,
    pending: Mutex<VecDeque<DiscoveredNode>>,
    store: SharedStore,
}

impl DiscoveryPool {
    pub fn open(store: SharedStore) -> Self {
        let known: BTreeMap<NodeId, DiscoveredNode> =
            load_json::<Vec<DiscoveredNode>>(store.as_ref(), keys::KNOWN_SATELLITES)
                .unwrap_or_default()
                .into_iter()
                .map(|n| (n.node_id(), n))
                .collect();
        let pending: VecDeque<DiscoveredNode> =
            load_json::<Vec<DiscoveredNode>>(store.as_ref(), keys::PENDING_DISCOVERY)
                .unwrap_or_default()
                .into();
        Self {
            known: RwLock::new(known),
            pending: Mutex::new(pending),
            store,
        }
    }

    /// Fold a scan in. `max(1, n * fraction)` results are queued as pending;
    /// the rest replace the known listing.
    pub fn absorb<R: Rng + ?Sized>(
        &self,
        mut found: Vec<DiscoveredNode>,
        fraction: f64,
        rng: &mut R,
    ) -> AbsorbReport {
        if found.is_empty() {
            return AbsorbReport::default();
        }
        found.shuffle(rng);
        let hold_back = ((found.len() as f64 * fraction) as usize).max(1).min(found.len());
        let listing = found.split_off(hold_back);

        let queued = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            let mut queued = 0;
            for node in found {
                if !pending.iter().any(|p| p.node_id() == node.node_id()) {
                    pending.push_back(node);
                    queued += 1;
                }
            }
            queued
        };

        let known = {
            let mut known = self.known.write().unwrap_or_else(PoisonError::into_inner);
            *known = listing.into_iter().map(|n| (n.node_id(), n)).collect();
            known.len()
        };

        self.persist();
        AbsorbReport { known, queued }
    }

    pub fn known(&self) -> Vec<DiscoveredNode> {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn known_ids(&self) -> Vec<NodeId> {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn pending(&self) -> Vec<DiscoveredNode> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Take the head of the pending queue.
    pub fn pop_pending(&self) -> Option<DiscoveredNode> {
        let head = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if head.is_some() {
            self.persist();
        }
        head
    }

    fn persist(&self) {
        save_json(self.store.as_ref(), keys::KNOWN_SATELLITES, &self.known());
        save_json(self.store.as_ref(), keys::PENDING_DISCOVERY, &self.pending());
    }
}
