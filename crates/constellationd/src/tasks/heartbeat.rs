//! Heartbeat — one gossip push cycle per interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use constellation_services::gossip::Gossip;

pub struct HeartbeatTask {
    gossip: Arc<Gossip>,
    period: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(gossip: Arc<Gossip>, period: Duration, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            gossip,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("heartbeat shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    self.gossip.push_cycle().await;
                }
            }
        }
    }
}
