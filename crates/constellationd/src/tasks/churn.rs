//! Churn — evict and promote on a randomized interval.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

use constellation_services::churn::ChurnManager;

pub struct ChurnTask {
    churn: Arc<ChurnManager>,
    shutdown: broadcast::Receiver<()>,
}

impl ChurnTask {
    pub fn new(churn: Arc<ChurnManager>, shutdown: broadcast::Receiver<()>) -> Self {
        Self { churn, shutdown }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut rng = StdRng::from_entropy();

        loop {
            let delay = self.churn.next_delay(&mut rng);
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("churn shutting down");
                    return Ok(());
                }

                _ = tokio::time::sleep(delay) => {
                    let report = self.churn.tick(&mut rng).await;
                    tracing::debug!(
                        evicted = ?report.evicted,
                        promoted = ?report.promoted,
                        "churn tick"
                    );
                }
            }
        }
    }
}
