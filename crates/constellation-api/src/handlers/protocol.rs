//! Peer protocol endpoints: /id, /handshake, /heartbeat, /route, /forward.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use constellation_core::message::{
    ForwardRequest, ForwardResponse, HandshakeRequest, HandshakeResponse, HeartbeatAck,
    HeartbeatPush, IdentifyResponse, RouteRequest, RouteResponse,
};

use super::ApiState;
use crate::error::ApiError;
use crate::extract::PeerContext;

// ── /id (GET) ─────────────────────────────────────────────────────────────────

pub async fn handle_identify(State(state): State<ApiState>) -> Json<IdentifyResponse> {
    let identity = &state.node.identity;
    Json(IdentifyResponse {
        status: "success".to_string(),
        data: identity.function.clone(),
        name: identity.name.clone(),
        public_key: identity.public_key.clone(),
    })
}

// ── /handshake (POST) ─────────────────────────────────────────────────────────

pub async fn handle_handshake(
    State(state): State<ApiState>,
    peer: PeerContext,
    payload: Result<Json<HandshakeRequest>, JsonRejection>,
) -> Result<Json<HandshakeResponse>, ApiError> {
    let Json(request) = payload?;
    let initiator_ip = peer
        .sender_ip()
        .ok_or_else(|| ApiError::bad_request("cannot determine initiator address"))?;
    let response = state.node.handshake.accept(request, &initiator_ip)?;
    Ok(Json(response))
}

// ── /heartbeat (POST) ─────────────────────────────────────────────────────────

pub async fn handle_heartbeat(
    State(state): State<ApiState>,
    peer: PeerContext,
    payload: Result<Json<HeartbeatPush>, JsonRejection>,
) -> Result<Json<HeartbeatAck>, ApiError> {
    let Json(push) = payload?;
    let sender = peer.envelope.as_ref().map(|h| h.source());
    let gossip = state.node.gossip.clone();
    // Merging persists the view; keep the file write off the runtime threads.
    let ack = tokio::task::spawn_blocking(move || gossip.receive(push, sender))
        .await
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("heartbeat merge failed: {e}"),
            )
        })?;
    Ok(Json(ack))
}

// ── /route (POST) ─────────────────────────────────────────────────────────────

pub async fn handle_route(
    State(state): State<ApiState>,
    _peer: PeerContext,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> Result<Json<RouteResponse>, ApiError> {
    let Json(request) = payload?;
    if request.source == request.destination {
        return Err(ApiError::bad_request("source and destination are the same node"));
    }
    Ok(Json(state.node.route(&request)?))
}

// ── /forward (POST) ───────────────────────────────────────────────────────────

pub async fn handle_forward(
    State(state): State<ApiState>,
    _peer: PeerContext,
    payload: Result<Json<ForwardRequest>, JsonRejection>,
) -> Result<Json<ForwardResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.node.relay.handle(request).await?))
}
