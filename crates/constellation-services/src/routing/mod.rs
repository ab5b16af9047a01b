//! Route generation, selection and failure-aware forwarding.

pub mod forwarder;
pub mod generator;
pub mod scoring;
pub mod selector;

use std::sync::{Arc, PoisonError, RwLock};

use constellation_core::RoutingTable;

use crate::store::{keys, load_json, save_json, SharedStore};

pub use forwarder::{
    FailureDetector, ForwardError, Forwarded, Forwarder, RandomFailure, StaticFailures,
};
pub use generator::{GeneratorConfig, RouteGenerator};
pub use selector::{composite_score, priority_weight, select, select_excluding, Selection};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("constellation view is empty")]
    EmptyConstellation,
}

/// The node's current routing table. Replaced wholesale on every rebuild;
/// readers hold an `Arc` to a consistent snapshot.
pub struct RoutingTableStore {
    current: RwLock<Arc<RoutingTable>>,
    store: SharedStore,
}

impl RoutingTableStore {
    pub fn open(store: SharedStore) -> Self {
        let table = load_json::<RoutingTable>(store.as_ref(), keys::ROUTING_TABLE).unwrap_or_default();
        Self {
            current: RwLock::new(Arc::new(table)),
            store,
        }
    }

    pub fn current(&self) -> Arc<RoutingTable> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, table: RoutingTable) {
        let table = Arc::new(table);
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *current = table.clone();
        }
        save_json(self.store.as_ref(), keys::ROUTING_TABLE, table.as_ref());
    }
}
