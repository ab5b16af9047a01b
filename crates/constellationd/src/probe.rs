//! System prober — liveness via `ping` or name resolution, capability via
//! the peer `/id` endpoint.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use constellation_core::config::LivenessMode;
use constellation_core::message::IdentifyResponse;
use constellation_core::NodeId;
use constellation_services::discovery::Prober;
use constellation_services::PeerTransport;

pub struct SystemProber {
    mode: LivenessMode,
    transport: Arc<dyn PeerTransport>,
}

impl SystemProber {
    pub fn new(mode: LivenessMode, transport: Arc<dyn PeerTransport>) -> Self {
        Self { mode, transport }
    }
}

#[async_trait]
impl Prober for SystemProber {
    async fn is_alive(&self, host: &str) -> bool {
        match self.mode {
            LivenessMode::Ping => tokio::process::Command::new("ping")
                .args(["-c", "1", "-W", "1", host])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or_else(|e| {
                    tracing::warn!(host, error = %e, "could not run ping");
                    false
                }),
            LivenessMode::Resolve => tokio::net::lookup_host((host, 0))
                .await
                .map(|mut addrs| addrs.next().is_some())
                .unwrap_or(false),
        }
    }

    async fn identify(&self, host: &str, port: u16) -> Option<IdentifyResponse> {
        let peer = NodeId::new(host, port);
        match self.transport.identify(&peer).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::trace!(peer = %peer, error = %e, "identify probe failed");
                None
            }
        }
    }
}
