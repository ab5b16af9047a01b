//! /status, /heartbeat/trigger and /churn/trigger handlers.

use axum::extract::State;
use axum::Json;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use constellation_core::NodeId;
use constellation_services::NodeStatus;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Json<NodeStatus> {
    Json(state.node.status())
}

// ── /heartbeat/trigger (POST) ─────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatTriggerResponse {
    pub targets: usize,
    pub delivered: usize,
    pub refused: usize,
    pub failed: usize,
    pub dropped: usize,
}

pub async fn handle_heartbeat_trigger(State(state): State<ApiState>) -> Json<HeartbeatTriggerResponse> {
    let report = state.node.gossip.push_cycle().await;
    Json(HeartbeatTriggerResponse {
        targets: report.targets,
        delivered: report.delivered,
        refused: report.refused,
        failed: report.failed,
        dropped: report.dropped,
    })
}

// ── /churn/trigger (POST) ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChurnTriggerResponse {
    pub evicted: Option<NodeId>,
    pub promoted: Option<NodeId>,
    pub promotion_failed: Option<NodeId>,
}

pub async fn handle_churn_trigger(State(state): State<ApiState>) -> Json<ChurnTriggerResponse> {
    let mut rng = StdRng::from_entropy();
    let report = state.node.churn.tick(&mut rng).await;
    Json(ChurnTriggerResponse {
        evicted: report.evicted,
        promoted: report.promoted,
        promotion_failed: report.promotion_failed,
    })
}
