//! Request metadata every peer endpoint may need: the decoded envelope
//! header, if sent, and the TCP peer address.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use constellation_core::envelope::{EnvelopeHeader, HEADER_NAME};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct PeerContext {
    pub envelope: Option<EnvelopeHeader>,
    pub remote: Option<SocketAddr>,
}

impl PeerContext {
    /// The sender's address: envelope source if present, else the TCP peer.
    pub fn sender_ip(&self) -> Option<String> {
        self.envelope
            .as_ref()
            .map(|h| h.source_ip.to_string())
            .or_else(|| self.remote.map(|addr| addr.ip().to_string()))
    }
}

impl<S> FromRequestParts<S> for PeerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let envelope = match parts.headers.get(HEADER_NAME) {
            None => None,
            Some(value) => {
                let text = value
                    .to_str()
                    .map_err(|_| ApiError::bad_request("envelope header is not ASCII"))?;
                let header = EnvelopeHeader::from_hex(text)
                    .map_err(|e| ApiError::bad_request(format!("malformed envelope: {e}")))?;
                Some(header)
            }
        };
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self { envelope, remote })
    }
}
