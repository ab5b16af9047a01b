//! reqwest-backed peer transport.
//!
//! Every request is stamped with an `X-Bobb-Header` envelope carrying a
//! per-client increasing sequence number. Peers addressed by hostname rather
//! than IPv4 are contacted without an envelope.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use constellation_core::config::NetworkConfig;
use constellation_core::envelope::{EnvelopeHeader, MessageType, HEADER_NAME};
use constellation_core::message::{
    ErrorBody, ForwardRequest, ForwardResponse, HandshakeRequest, HandshakeResponse,
    HeartbeatAck, HeartbeatPush, IdentifyResponse,
};
use constellation_core::NodeId;
use constellation_services::transport::{PeerTransport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    scheme: String,
    local: NodeId,
    sequence: AtomicU32,
}

impl HttpTransport {
    pub fn new(local: NodeId, network: &NetworkConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(network.request_timeout())
            .danger_accept_invalid_certs(network.accept_invalid_certs)
            .build()?;
        Ok(Self {
            client,
            scheme: network.scheme.clone(),
            local,
            sequence: AtomicU32::new(0),
        })
    }

    fn url(&self, peer: &NodeId, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme, peer.ip, peer.port, path)
    }

    fn envelope(&self, message_type: MessageType, peer: &NodeId) -> Option<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        EnvelopeHeader::new(message_type, &self.local, peer, seq)
            .ok()
            .map(|h| h.to_hex())
    }

    fn stamp(
        &self,
        builder: reqwest::RequestBuilder,
        message_type: MessageType,
        peer: &NodeId,
    ) -> reqwest::RequestBuilder {
        match self.envelope(message_type, peer) {
            Some(hex) => builder.header(HEADER_NAME, hex),
            None => builder,
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        peer: &NodeId,
        builder: reqwest::RequestBuilder,
    ) -> Result<R, TransportError> {
        let response = builder.send().await.map_err(|e| request_error(peer, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(TransportError::Rejected {
                peer: peer.clone(),
                status: status.as_u16(),
                body,
            });
        }
        response.json::<R>().await.map_err(|e| TransportError::Decode {
            peer: peer.clone(),
            detail: e.to_string(),
        })
    }

    async fn post<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        peer: &NodeId,
        path: &str,
        message_type: MessageType,
        body: &T,
    ) -> Result<R, TransportError> {
        let builder = self.client.post(self.url(peer, path)).json(body);
        let builder = self.stamp(builder, message_type, peer);
        tracing::trace!(peer = %peer, path, "peer request");
        self.send(peer, builder).await
    }
}

fn request_error(peer: &NodeId, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { peer: peer.clone() }
    } else {
        TransportError::Unreachable {
            peer: peer.clone(),
            detail: e.to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn identify(&self, peer: &NodeId) -> Result<IdentifyResponse, TransportError> {
        let builder = self.client.get(self.url(peer, "/id"));
        let builder = self.stamp(builder, MessageType::Identify, peer);
        self.send(peer, builder).await
    }

    async fn handshake(
        &self,
        peer: &NodeId,
        request: &HandshakeRequest,
    ) -> Result<HandshakeResponse, TransportError> {
        self.post(peer, "/handshake", MessageType::Handshake, request).await
    }

    async fn heartbeat(
        &self,
        peer: &NodeId,
        push: &HeartbeatPush,
    ) -> Result<HeartbeatAck, TransportError> {
        self.post(peer, "/heartbeat", MessageType::Heartbeat, push).await
    }

    async fn forward(
        &self,
        peer: &NodeId,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, TransportError> {
        self.post(peer, "/forward", MessageType::Forward, request).await
    }
}
