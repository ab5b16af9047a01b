//! constellationd — satellite constellation node daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use constellation_core::config::NodeConfig;
use constellation_core::identity::Keypair;
use constellation_services::discovery::DiscoveryProbe;
use constellation_services::routing::RandomFailure;
use constellation_services::store::{FileStore, MemoryStore, SharedStore};
use constellation_services::{NodeContext, PeerTransport};

use constellation_api::{ApiState, HttpTransport};

mod probe;
mod tasks;

use probe::SystemProber;
use tasks::{ChurnTask, DiscoveryTask, HandshakeSweepTask, HeartbeatTask};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = NodeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = NodeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        let mut config = NodeConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    });
    config.validate().context("invalid configuration")?;

    let self_id = config.node_id();
    tracing::info!(
        node = %self_id,
        name = %config.device_name(),
        function = %config.identity.function,
        "constellationd starting"
    );

    // Keypair
    let keypair = Keypair::load_or_generate(&config.identity.keypair_path)
        .context("failed to load keypair")?;
    tracing::info!(public_key = %keypair.public_hex(), "keypair ready");

    // Storage
    let store: SharedStore = if config.storage.persist {
        let root = config.node_data_dir();
        let store = FileStore::new(root.clone()).context("failed to open node storage")?;
        tracing::info!(root = %root.display(), "node storage initialized");
        Arc::new(store)
    } else {
        tracing::info!("persistence disabled, state kept in memory");
        MemoryStore::shared()
    };

    // Peer transport and failure simulation
    let transport: Arc<dyn PeerTransport> = Arc::new(
        HttpTransport::new(self_id.clone(), &config.network)
            .context("failed to build HTTP client")?,
    );
    let detector = Arc::new(RandomFailure::new(config.routing.failure_probability));

    let node = NodeContext::new(
        config.clone(),
        keypair.public_hex(),
        store,
        transport.clone(),
        detector,
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Routing ──────────────────────────────────────────────────────────────

    let rebuild_task = node.rebuilder.clone().spawn(shutdown_tx.subscribe());
    match node.rebuilder.rebuild_now() {
        Ok(count) => tracing::info!(routes = count, "initial routing table built"),
        Err(e) => tracing::debug!(error = %e, "no initial routing table"),
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let api_task = {
        let state = ApiState::new(node.clone());
        let bind = config.network.bind.clone();
        let port = config.network.port;
        tokio::spawn(async move { constellation_api::serve(state, &bind, port).await })
    };

    let heartbeat_period = Duration::from_secs(config.gossip.heartbeat_interval_secs.max(1));

    let discovery_task = {
        let prober = Arc::new(SystemProber::new(config.discovery.liveness, transport.clone()));
        let probe = DiscoveryProbe::new(prober, config.discovery.clone(), self_id.clone());
        tokio::spawn(
            DiscoveryTask::new(
                probe,
                node.pool.clone(),
                config.discovery.pending_fraction,
                Duration::from_secs(config.discovery.interval_secs.max(1)),
                shutdown_tx.subscribe(),
            )
            .run(),
        )
    };

    let handshake_task = tokio::spawn(
        HandshakeSweepTask::new(
            node.handshake.clone(),
            node.pool.clone(),
            heartbeat_period,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let heartbeat_task = tokio::spawn(
        HeartbeatTask::new(node.gossip.clone(), heartbeat_period, shutdown_tx.subscribe()).run(),
    );

    let churn_task = if config.churn.enabled {
        tokio::spawn(ChurnTask::new(node.churn.clone(), shutdown_tx.subscribe()).run())
    } else {
        tracing::info!("churn disabled");
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            Ok::<(), anyhow::Error>(())
        })
    };

    let status_printer = {
        let node = node.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                let status = node.status();
                tracing::info!(
                    neighbours = status.neighbours,
                    blocklisted = status.blocklisted,
                    known = status.known,
                    pending = status.pending,
                    view = status.view_entries,
                    routes = status.routes,
                    rebuilds = status.rebuilds,
                    phase = %status.gossip_phase,
                    "node status"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = api_task            => tracing::error!("api server exited: {:?}", r),
        r = rebuild_task        => tracing::error!("route rebuilder exited: {:?}", r),
        r = discovery_task      => tracing::error!("discovery exited: {:?}", r),
        r = handshake_task      => tracing::error!("handshake sweep exited: {:?}", r),
        r = heartbeat_task      => tracing::error!("heartbeat exited: {:?}", r),
        r = churn_task          => tracing::error!("churn exited: {:?}", r),
        r = status_printer      => tracing::error!("status printer exited: {:?}", r),
    }

    Ok(())
}
