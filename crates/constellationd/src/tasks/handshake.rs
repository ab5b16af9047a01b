//! Handshake sweep — handshake every known satellite that is not yet a
//! neighbour.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use constellation_services::discovery::DiscoveryPool;
use constellation_services::handshake::HandshakeProtocol;

pub struct HandshakeSweepTask {
    handshake: Arc<HandshakeProtocol>,
    pool: Arc<DiscoveryPool>,
    period: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl HandshakeSweepTask {
    pub fn new(
        handshake: Arc<HandshakeProtocol>,
        pool: Arc<DiscoveryPool>,
        period: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            handshake,
            pool,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.period);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("handshake sweep shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let known = self.pool.known_ids();
                    if known.is_empty() {
                        continue;
                    }
                    let report = self.handshake.sweep(&known).await;
                    tracing::debug!(
                        established = report.established,
                        already = report.already,
                        blocked = report.blocked,
                        refused = report.refused,
                        failed = report.failed,
                        "handshake sweep"
                    );
                }
            }
        }
    }
}
