//! Discovery sweep — scan candidates and refresh the discovery pool.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

use constellation_services::discovery::{DiscoveryPool, DiscoveryProbe};

pub struct DiscoveryTask {
    probe: DiscoveryProbe,
    pool: Arc<DiscoveryPool>,
    pending_fraction: f64,
    period: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl DiscoveryTask {
    pub fn new(
        probe: DiscoveryProbe,
        pool: Arc<DiscoveryPool>,
        pending_fraction: f64,
        period: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            probe,
            pool,
            pending_fraction,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.period);
        let mut rng = StdRng::from_entropy();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("discovery shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let found = self.probe.scan().await;
                    let report = self.pool.absorb(found, self.pending_fraction, &mut rng);
                    tracing::info!(known = report.known, queued = report.queued, "discovery sweep");
                }
            }
        }
    }
}
