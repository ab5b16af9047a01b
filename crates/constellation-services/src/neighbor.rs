//! Neighbour table and blocklist.
//!
//! Both tables are keyed by `NodeId` and persisted as a JSON list on every
//! mutation. The persist path serializes writers and snapshots under the
//! same lock, so the last write to land is always the latest state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use constellation_core::{NeighborRecord, NodeId};

use crate::store::{keys, load_json, save_json, SharedStore};

// ── Shared table plumbing ─────────────────────────────────────────────────────

#[derive(Clone)]
struct Table {
    records: Arc<DashMap<NodeId, NeighborRecord>>,
    store: SharedStore,
    key: &'static str,
    persist_lock: Arc<Mutex<()>>,
}

impl Table {
    fn open(store: SharedStore, key: &'static str) -> Self {
        let table = Self {
            records: Arc::new(DashMap::new()),
            store,
            key,
            persist_lock: Arc::new(Mutex::new(())),
        };
        if let Some(list) = load_json::<Vec<NeighborRecord>>(table.store.as_ref(), key) {
            let count = list.len();
            for record in list {
                table.records.insert(record.node_id(), record);
            }
            if count > 0 {
                tracing::info!(count, table = key, "loaded persisted records");
            }
        }
        table
    }

    fn sorted(&self) -> Vec<NeighborRecord> {
        let mut list: Vec<NeighborRecord> = self.records.iter().map(|e| e.value().clone()).collect();
        list.sort_by(|a, b| (&a.ip, a.port).cmp(&(&b.ip, b.port)));
        list
    }

    fn persist(&self) {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        save_json(self.store.as_ref(), self.key, &self.sorted());
    }
}

// ── NeighborStore ─────────────────────────────────────────────────────────────

/// Established neighbours of the local node.
#[derive(Clone)]
pub struct NeighborStore {
    table: Table,
}

impl NeighborStore {
    /// Open the table, reloading any persisted neighbours.
    pub fn open(store: SharedStore) -> Self {
        Self {
            table: Table::open(store, keys::NEIGHBOURS),
        }
    }

    /// Insert `record` unless its `(ip, port)` is already present.
    /// Returns true if inserted.
    pub fn insert_if_absent(&self, record: NeighborRecord) -> bool {
        let id = record.node_id();
        let inserted = match self.table.records.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        };
        if inserted {
            self.table.persist();
            tracing::info!(peer = %id, "neighbour added");
        }
        inserted
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.table.records.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<NeighborRecord> {
        self.table.records.get(id).map(|r| r.value().clone())
    }

    /// Refresh `last_contact` for every id after a successful exchange.
    /// Persists once for the whole batch. Returns how many were present.
    pub fn touch_all(&self, ids: &[NodeId], now_ms: u64) -> usize {
        let mut touched = 0;
        for id in ids {
            if let Some(mut record) = self.table.records.get_mut(id) {
                record.last_contact = record.last_contact.max(now_ms);
                touched += 1;
            }
        }
        if touched > 0 {
            self.table.persist();
        }
        touched
    }

    pub fn remove(&self, id: &NodeId) -> Option<NeighborRecord> {
        let removed = self.table.records.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            self.table.persist();
        }
        removed
    }

    /// Remove and return every neighbour silent for longer than `window_ms`.
    pub fn take_stale(&self, now_ms: u64, window_ms: u64) -> Vec<NeighborRecord> {
        let stale: Vec<NodeId> = self
            .table
            .records
            .iter()
            .filter(|e| now_ms.saturating_sub(e.value().last_contact) > window_ms)
            .map(|e| e.key().clone())
            .collect();
        let removed: Vec<NeighborRecord> = stale
            .iter()
            .filter_map(|id| self.table.records.remove(id).map(|(_, r)| r))
            .collect();
        if !removed.is_empty() {
            self.table.persist();
        }
        removed
    }

    /// All neighbours, ordered by address.
    pub fn list(&self) -> Vec<NeighborRecord> {
        self.table.sorted()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.list().iter().map(NeighborRecord::node_id).collect()
    }

    /// Neighbours as the map carried in a constellation entry.
    pub fn as_map(&self) -> BTreeMap<NodeId, NeighborRecord> {
        self.table
            .records
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.records.is_empty()
    }
}

// ── Blocklist ─────────────────────────────────────────────────────────────────

/// Evicted neighbours. Entries never expire; only [`Blocklist::remove`]
/// takes one out.
#[derive(Clone)]
pub struct Blocklist {
    table: Table,
}

impl Blocklist {
    pub fn open(store: SharedStore) -> Self {
        Self {
            table: Table::open(store, keys::BLOCKLIST),
        }
    }

    pub fn block(&self, record: NeighborRecord) {
        let id = record.node_id();
        self.table.records.insert(id.clone(), record);
        self.table.persist();
        tracing::info!(peer = %id, "neighbour blocklisted");
    }

    /// True if `(ip, port)` is blocklisted, whatever key it now presents.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.table.records.contains_key(id)
    }

    /// True if this exact `(ip, port, public_key)` triple is blocklisted.
    pub fn is_blocked(&self, id: &NodeId, public_key: &str) -> bool {
        self.table
            .records
            .get(id)
            .map(|r| r.public_key == public_key)
            .unwrap_or(false)
    }

    pub fn remove(&self, id: &NodeId) -> Option<NeighborRecord> {
        let removed = self.table.records.remove(id).map(|(_, r)| r);
        if removed.is_some() {
            self.table.persist();
            tracing::info!(peer = %id, "blocklist entry removed");
        }
        removed
    }

    pub fn list(&self) -> Vec<NeighborRecord> {
        self.table.sorted()
    }

    pub fn len(&self) -> usize {
        self.table.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.records.is_empty()
    }
}
