//! Peer transport seam.
//!
//! The engine never speaks HTTP itself. Everything that leaves the node goes
//! through [`PeerTransport`]; the API crate provides the reqwest client, and
//! tests provide a scripted in-process one.

use async_trait::async_trait;

use constellation_core::message::{
    ErrorBody, ForwardRequest, ForwardResponse, HandshakeRequest, HandshakeResponse,
    HeartbeatAck, HeartbeatPush, IdentifyResponse,
};
use constellation_core::NodeId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("peer {peer} unreachable: {detail}")]
    Unreachable { peer: NodeId, detail: String },

    #[error("request to {peer} timed out")]
    Timeout { peer: NodeId },

    #[error("peer {peer} answered {status}")]
    Rejected {
        peer: NodeId,
        status: u16,
        body: Option<ErrorBody>,
    },

    #[error("malformed response from {peer}: {detail}")]
    Decode { peer: NodeId, detail: String },
}

impl TransportError {
    pub fn peer(&self) -> &NodeId {
        match self {
            TransportError::Unreachable { peer, .. }
            | TransportError::Timeout { peer }
            | TransportError::Rejected { peer, .. }
            | TransportError::Decode { peer, .. } => peer,
        }
    }
}

/// Outbound peer protocol.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Ask a node for its declared function.
    async fn identify(&self, peer: &NodeId) -> Result<IdentifyResponse, TransportError>;

    async fn handshake(
        &self,
        peer: &NodeId,
        request: &HandshakeRequest,
    ) -> Result<HandshakeResponse, TransportError>;

    async fn heartbeat(
        &self,
        peer: &NodeId,
        push: &HeartbeatPush,
    ) -> Result<HeartbeatAck, TransportError>;

    async fn forward(
        &self,
        peer: &NodeId,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, TransportError>;
}
