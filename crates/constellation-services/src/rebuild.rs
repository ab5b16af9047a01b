//! Coalescing routing-table rebuilder.
//!
//! One background worker regenerates the table from the latest view.
//! `trigger()` never blocks: triggers that arrive while a rebuild runs
//! collapse into a single follow-up rebuild.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::gossip::ConstellationView;
use crate::routing::{RouteGenerator, RoutingError, RoutingTableStore};

pub struct RouteRebuilder {
    view: Arc<ConstellationView>,
    tables: Arc<RoutingTableStore>,
    generator: RouteGenerator,
    wake: Notify,
    pending: AtomicBool,
    completed: AtomicU64,
}

impl RouteRebuilder {
    pub fn new(
        view: Arc<ConstellationView>,
        tables: Arc<RoutingTableStore>,
        generator: RouteGenerator,
    ) -> Self {
        Self {
            view,
            tables,
            generator,
            wake: Notify::new(),
            pending: AtomicBool::new(false),
            completed: AtomicU64::new(0),
        }
    }

    /// Request a rebuild.
    pub fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Rebuilds finished since start.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Rebuild synchronously from the current view. Returns the route count.
    pub fn rebuild_now(&self) -> Result<usize, RoutingError> {
        let view = self.view.snapshot();
        let table = self.generator.generate(&view, &mut StdRng::from_entropy())?;
        let routes = table.route_count();
        self.tables.replace(table);
        self.completed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(nodes = view.len(), routes, "routing table rebuilt");
        Ok(routes)
    }

    /// Start the worker. It exits when `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::debug!("route rebuilder shutting down");
                        return;
                    }
                    _ = self.wake.notified() => {}
                }

                while self.pending.swap(false, Ordering::AcqRel) {
                    let this = self.clone();
                    match tokio::task::spawn_blocking(move || this.rebuild_now()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::warn!(error = %e, "route rebuild skipped"),
                        Err(e) => tracing::error!(error = %e, "route rebuild panicked"),
                    }
                }
            }
        })
    }
}
