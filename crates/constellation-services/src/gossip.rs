//! Constellation gossip — heartbeat push and freshness-ordered merge.
//!
//! Every heartbeat interval a node stamps its own entry (`freshness = now`,
//! current live neighbours), and pushes its whole view to each live
//! neighbour. Receivers merge entry by entry: a strictly fresher entry
//! replaces the stored one, or only bumps freshness when the neighbour set
//! is unchanged. Older or equal entries are ignored, so merging is
//! idempotent and stored freshness never decreases.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;

use constellation_core::config::GossipConfig;
use constellation_core::message::{HeartbeatAck, HeartbeatPush};
use constellation_core::{now_ms, ConstellationEntry, ConstellationSnapshot, NodeId};

use crate::neighbor::{Blocklist, NeighborStore};
use crate::rebuild::RouteRebuilder;
use crate::store::{keys, load_json, save_json, SharedStore};
use crate::transport::{PeerTransport, TransportError};

// ── ConstellationView ─────────────────────────────────────────────────────────

/// Counts from one merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub replaced: usize,
    /// Freshness raised, neighbour set unchanged.
    pub bumped: usize,
    pub ignored: usize,
}

impl MergeReport {
    /// Entries whose neighbour set is new or different.
    pub fn topology_changed(&self) -> usize {
        self.inserted + self.replaced
    }

    pub fn any_change(&self) -> bool {
        self.inserted + self.replaced + self.bumped > 0
    }
}

/// The locally known union of every node's self-reported neighbours.
pub struct ConstellationView {
    entries: RwLock<ConstellationSnapshot>,
    self_id: NodeId,
    store: SharedStore,
    persist_lock: Mutex<()>,
}

impl ConstellationView {
    pub fn open(store: SharedStore, self_id: NodeId) -> Self {
        let entries =
            load_json::<ConstellationSnapshot>(store.as_ref(), keys::CONSTELLATION).unwrap_or_default();
        if !entries.is_empty() {
            tracing::info!(entries = entries.len(), "loaded persisted constellation view");
        }
        Self {
            entries: RwLock::new(entries),
            self_id,
            store,
            persist_lock: Mutex::new(()),
        }
    }

    /// Merge a received view. Entries keyed by the local node are ignored;
    /// the local node is authoritative for its own entry.
    pub fn merge(&self, incoming: ConstellationSnapshot) -> MergeReport {
        let mut report = MergeReport::default();
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            for (id, entry) in incoming {
                if id == self.self_id {
                    report.ignored += 1;
                    continue;
                }
                match entries.get_mut(&id) {
                    None => {
                        entries.insert(id, entry);
                        report.inserted += 1;
                    }
                    Some(local) if entry.freshness > local.freshness => {
                        if local.same_neighbour_set(&entry) {
                            local.freshness = entry.freshness;
                            report.bumped += 1;
                        } else {
                            *local = entry;
                            report.replaced += 1;
                        }
                    }
                    Some(_) => report.ignored += 1,
                }
            }
        }
        if report.any_change() {
            self.persist();
        }
        report
    }

    /// Store the local node's own entry. Returns true if its neighbour set
    /// is new or changed.
    pub fn upsert_self(&self, entry: ConstellationEntry) -> bool {
        let changed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let changed = entries
                .get(&self.self_id)
                .map_or(true, |old| !old.same_neighbour_set(&entry));
            entries.insert(self.self_id.clone(), entry);
            changed
        };
        self.persist();
        changed
    }

    pub fn snapshot(&self) -> ConstellationSnapshot {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &NodeId) -> Option<ConstellationEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    /// Snapshot and write under one lock so the last write is the latest view.
    fn persist(&self) {
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        save_json(self.store.as_ref(), keys::CONSTELLATION, &self.snapshot());
    }
}

// ── Gossip ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GossipPhase {
    Idle = 0,
    Pushing = 1,
    Merging = 2,
}

impl GossipPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => GossipPhase::Pushing,
            2 => GossipPhase::Merging,
            _ => GossipPhase::Idle,
        }
    }
}

/// Counts from one push cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    /// Neighbours dropped for exceeding the liveness window.
    pub dropped: usize,
    pub targets: usize,
    pub delivered: usize,
    /// Pushes the receiver answered with `ack: false`.
    pub refused: usize,
    pub failed: usize,
}

pub struct Gossip {
    view: Arc<ConstellationView>,
    neighbours: NeighborStore,
    blocklist: Blocklist,
    transport: Arc<dyn PeerTransport>,
    rebuilder: Arc<RouteRebuilder>,
    config: GossipConfig,
    request_timeout: Duration,
    cycle: tokio::sync::Mutex<()>,
    phase: AtomicU8,
}

impl Gossip {
    pub fn new(
        view: Arc<ConstellationView>,
        neighbours: NeighborStore,
        blocklist: Blocklist,
        transport: Arc<dyn PeerTransport>,
        rebuilder: Arc<RouteRebuilder>,
        config: GossipConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            view,
            neighbours,
            blocklist,
            transport,
            rebuilder,
            config,
            request_timeout,
            cycle: tokio::sync::Mutex::new(()),
            phase: AtomicU8::new(GossipPhase::Idle as u8),
        }
    }

    pub fn phase(&self) -> GossipPhase {
        GossipPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn view(&self) -> &Arc<ConstellationView> {
        &self.view
    }

    /// Run one push cycle. Overlapping calls wait for the running cycle.
    pub async fn push_cycle(&self) -> PushReport {
        let _cycle = self.cycle.lock().await;
        self.phase.store(GossipPhase::Pushing as u8, Ordering::Release);

        let mut report = PushReport::default();
        let now = now_ms();

        let stale = self
            .neighbours
            .take_stale(now, self.config.liveness_window_ms());
        report.dropped = stale.len();
        for record in stale {
            tracing::info!(peer = %record.node_id(), last_contact = record.last_contact, "neighbour timed out");
            if self.config.blocklist_stale_neighbours {
                self.blocklist.block(record);
            }
        }

        let mut live = self.neighbours.as_map();
        live.retain(|id, _| !self.blocklist.contains(id));
        let targets: Vec<NodeId> = live.keys().cloned().collect();

        let own = ConstellationEntry {
            freshness: now,
            neighbours: live,
        };
        if self.view.upsert_self(own) {
            self.rebuilder.trigger();
        }

        let push = HeartbeatPush {
            constellation: self.view.snapshot(),
            sender: Some(self.view.self_id().clone()),
        };
        report.targets = targets.len();

        let results = join_all(targets.iter().map(|peer| async {
            match tokio::time::timeout(self.request_timeout, self.transport.heartbeat(peer, &push)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout { peer: peer.clone() }),
            }
        }))
        .await;

        // Only acknowledged pushes count as contact. A peer that has
        // blocklisted us refuses, and ages out of our table.
        let mut acked = Vec::with_capacity(targets.len());
        for (peer, result) in targets.iter().zip(results) {
            match result {
                Ok(ack) if ack.ack => {
                    acked.push(peer.clone());
                    report.delivered += 1;
                }
                Ok(_) => {
                    tracing::debug!(peer = %peer, "heartbeat refused");
                    report.refused += 1;
                }
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "heartbeat push failed");
                    report.failed += 1;
                }
            }
        }
        self.neighbours.touch_all(&acked, now_ms());

        self.phase.store(GossipPhase::Idle as u8, Ordering::Release);
        tracing::debug!(
            targets = report.targets,
            delivered = report.delivered,
            refused = report.refused,
            failed = report.failed,
            dropped = report.dropped,
            "heartbeat cycle complete"
        );
        report
    }

    /// Merge a received heartbeat and schedule a routing rebuild.
    ///
    /// `sender` is the transport-level origin, if known; it takes precedence
    /// over the sender named in the push. Pushes from blocklisted nodes are
    /// refused without merging.
    pub fn receive(&self, push: HeartbeatPush, sender: Option<NodeId>) -> HeartbeatAck {
        if let Some(sender) = sender.or_else(|| push.sender.clone()) {
            if self.blocklist.contains(&sender) {
                tracing::debug!(peer = %sender, "refusing heartbeat from blocklisted node");
                return HeartbeatAck {
                    ack: false,
                    changed: 0,
                };
            }
        }

        let entered = self
            .phase
            .compare_exchange(
                GossipPhase::Idle as u8,
                GossipPhase::Merging as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        let report = self.view.merge(push.constellation);
        if report.any_change() {
            self.rebuilder.trigger();
        }

        if entered {
            let _ = self.phase.compare_exchange(
                GossipPhase::Merging as u8,
                GossipPhase::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        tracing::trace!(
            inserted = report.inserted,
            replaced = report.replaced,
            bumped = report.bumped,
            ignored = report.ignored,
            "heartbeat merged"
        );
        HeartbeatAck {
            ack: true,
            changed: report.topology_changed(),
        }
    }
}
