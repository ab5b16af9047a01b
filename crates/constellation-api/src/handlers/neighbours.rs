//! /neighbours, /blocklist, /constellation and /discovery handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use constellation_core::{ConstellationSnapshot, NeighborRecord, NodeId};
use constellation_services::discovery::DiscoveredNode;

use super::ApiState;
use crate::error::ApiError;

// ── /neighbours (GET) ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct NeighboursResponse {
    pub neighbours: Vec<NeighborRecord>,
}

pub async fn handle_neighbours(State(state): State<ApiState>) -> Json<NeighboursResponse> {
    Json(NeighboursResponse {
        neighbours: state.node.neighbours.list(),
    })
}

// ── /blocklist (GET) ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct BlocklistResponse {
    pub blocklisted: Vec<NeighborRecord>,
}

pub async fn handle_blocklist(State(state): State<ApiState>) -> Json<BlocklistResponse> {
    Json(BlocklistResponse {
        blocklisted: state.node.blocklist.list(),
    })
}

// ── /blocklist/remove (POST) ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct UnblockRequest {
    pub node: NodeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnblockResponse {
    pub removed: NeighborRecord,
}

pub async fn handle_blocklist_remove(
    State(state): State<ApiState>,
    payload: Result<Json<UnblockRequest>, JsonRejection>,
) -> Result<Json<UnblockResponse>, ApiError> {
    let Json(request) = payload?;
    let removed = state
        .node
        .blocklist
        .remove(&request.node)
        .ok_or_else(|| ApiError::not_found(format!("{} is not blocklisted", request.node)))?;
    tracing::info!(peer = %request.node, "blocklist entry removed by operator");
    Ok(Json(UnblockResponse { removed }))
}

// ── /constellation (GET) ──────────────────────────────────────────────────────

pub async fn handle_constellation(State(state): State<ApiState>) -> Json<ConstellationSnapshot> {
    Json(state.node.view.snapshot())
}

// ── /discovery (GET) ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub known: Vec<DiscoveredNode>,
    pub pending: Vec<DiscoveredNode>,
}

pub async fn handle_discovery(State(state): State<ApiState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        known: state.node.pool.known(),
        pending: state.node.pool.pending(),
    })
}
