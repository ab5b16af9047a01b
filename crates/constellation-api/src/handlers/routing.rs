//! /routes and /forward operator handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use constellation_core::message::ForwardResponse;
use constellation_core::route::RoutesFrom;
use constellation_core::NodeId;

use super::ApiState;
use crate::error::ApiError;

// ── /routes (GET) ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RoutesQuery {
    pub dest: Option<NodeId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoutesResponse {
    pub source: NodeId,
    pub routes: RoutesFrom,
}

/// The local node's own routes, optionally narrowed to one destination.
pub async fn handle_routes(
    State(state): State<ApiState>,
    Query(query): Query<RoutesQuery>,
) -> Result<Json<RoutesResponse>, ApiError> {
    let source = state.node.id().clone();
    let table = state.node.tables.current();
    let mut routes = table.from_source(&source).cloned().unwrap_or_default();
    if let Some(dest) = query.dest {
        let found = routes
            .remove(&dest)
            .ok_or_else(|| ApiError::not_found(format!("no routes to {dest}")))?;
        routes = RoutesFrom::from([(dest, found)]);
    }
    Ok(Json(RoutesResponse { source, routes }))
}

// ── /forward (POST) ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct OriginateRequest {
    pub destination: NodeId,
    pub message: String,
}

/// Send a message from this node through the relay.
pub async fn handle_originate(
    State(state): State<ApiState>,
    payload: Result<Json<OriginateRequest>, JsonRejection>,
) -> Result<Json<ForwardResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state
        .node
        .relay
        .originate(request.destination, request.message)
        .await?;
    Ok(Json(response))
}
