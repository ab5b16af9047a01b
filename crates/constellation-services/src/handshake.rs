//! Handshake protocol — turns a discovered candidate into a neighbour.
//!
//! The initiator sends its identity; the acceptor records the initiator
//! (unless already present or blocklisted) and answers with its own identity
//! so the initiator can record it in turn. Deduplication is by `(ip, port)`,
//! and a duplicate is reported as `AlreadyNeighbour`, never as an error.

use std::sync::Arc;

use futures::future::join_all;

use constellation_core::identity::is_known_function;
use constellation_core::message::{AcceptOutcome, HandshakeRequest, HandshakeResponse};
use constellation_core::{now_ms, NeighborRecord, NodeId};

use crate::neighbor::{Blocklist, NeighborStore};
use crate::transport::{PeerTransport, TransportError};

/// Who this node says it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: NodeId,
    pub name: String,
    pub function: String,
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Established(NeighborRecord),
    AlreadyNeighbour,
    /// The candidate is blocklisted locally.
    Blocked,
    /// The candidate has us blocklisted; nothing is recorded.
    Refused,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown device function {0:?}")]
    UnknownFunction(String),

    #[error("refusing to handshake with self")]
    SelfHandshake,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandshakeError {
    /// Caller-side input problem, as opposed to a network failure.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            HandshakeError::MissingField(_)
                | HandshakeError::UnknownFunction(_)
                | HandshakeError::SelfHandshake
        )
    }
}

/// Tally of one sweep over the known pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub established: usize,
    pub already: usize,
    pub blocked: usize,
    pub refused: usize,
    pub failed: usize,
}

pub struct HandshakeProtocol {
    identity: LocalIdentity,
    neighbours: NeighborStore,
    blocklist: Blocklist,
    transport: Arc<dyn PeerTransport>,
}

impl HandshakeProtocol {
    pub fn new(
        identity: LocalIdentity,
        neighbours: NeighborStore,
        blocklist: Blocklist,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            identity,
            neighbours,
            blocklist,
            transport,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    fn request(&self) -> HandshakeRequest {
        HandshakeRequest {
            device_name: self.identity.name.clone(),
            device_function: Some(self.identity.function.clone()),
            public_key: Some(self.identity.public_key.clone()),
            port: Some(self.identity.id.port),
            connected_nodes: self.neighbours.ids(),
        }
    }

    /// Initiate a handshake with `candidate`.
    pub async fn initiate(&self, candidate: &NodeId) -> Result<HandshakeOutcome, HandshakeError> {
        if *candidate == self.identity.id {
            return Err(HandshakeError::SelfHandshake);
        }
        if self.blocklist.contains(candidate) {
            return Ok(HandshakeOutcome::Blocked);
        }
        if self.neighbours.contains(candidate) {
            return Ok(HandshakeOutcome::AlreadyNeighbour);
        }

        let reply = self.transport.handshake(candidate, &self.request()).await?;
        if reply.device_function.is_empty() {
            return Err(HandshakeError::MissingField("device_function"));
        }
        if !is_known_function(&reply.device_function) {
            return Err(HandshakeError::UnknownFunction(reply.device_function));
        }
        if reply.outcome == AcceptOutcome::Blocked {
            tracing::debug!(peer = %candidate, "handshake refused by blocklisting peer");
            return Ok(HandshakeOutcome::Refused);
        }

        // Churn may blocklist the candidate while the request is in flight.
        if self.blocklist.contains(candidate) {
            return Ok(HandshakeOutcome::Blocked);
        }

        let record = NeighborRecord {
            ip: candidate.ip.clone(),
            port: candidate.port,
            function: reply.device_function,
            public_key: reply.public_key,
            last_contact: now_ms(),
        };
        if self.neighbours.insert_if_absent(record.clone()) {
            tracing::info!(peer = %candidate, function = %record.function, remote_outcome = ?reply.outcome, "handshake established");
            Ok(HandshakeOutcome::Established(record))
        } else {
            Ok(HandshakeOutcome::AlreadyNeighbour)
        }
    }

    /// Handle an inbound handshake. `initiator_ip` is the address the
    /// transport attributes the request to.
    pub fn accept(
        &self,
        request: HandshakeRequest,
        initiator_ip: &str,
    ) -> Result<HandshakeResponse, HandshakeError> {
        let function = request
            .device_function
            .filter(|f| !f.is_empty())
            .ok_or(HandshakeError::MissingField("device_function"))?;
        let public_key = request
            .public_key
            .filter(|k| !k.is_empty())
            .ok_or(HandshakeError::MissingField("public_key"))?;
        let port = request.port.ok_or(HandshakeError::MissingField("port"))?;
        if !is_known_function(&function) {
            return Err(HandshakeError::UnknownFunction(function));
        }

        let initiator = NodeId::new(initiator_ip, port);
        if initiator == self.identity.id {
            return Err(HandshakeError::SelfHandshake);
        }

        let outcome = if self.blocklist.contains(&initiator) {
            tracing::debug!(peer = %initiator, "handshake from blocklisted node");
            AcceptOutcome::Blocked
        } else if self.neighbours.insert_if_absent(NeighborRecord {
            ip: initiator.ip.clone(),
            port,
            function,
            public_key,
            last_contact: now_ms(),
        }) {
            AcceptOutcome::Added
        } else {
            AcceptOutcome::AlreadyNeighbour
        };

        Ok(HandshakeResponse {
            device_name: self.identity.name.clone(),
            device_function: self.identity.function.clone(),
            public_key: self.identity.public_key.clone(),
            port: self.identity.id.port,
            connected_nodes: self.neighbours.ids(),
            outcome,
        })
    }

    /// Handshake concurrently with every known node that is not yet a neighbour.
    pub async fn sweep(&self, known: &[NodeId]) -> SweepReport {
        let targets: Vec<&NodeId> = known
            .iter()
            .filter(|id| **id != self.identity.id && !self.neighbours.contains(id))
            .collect();
        let results = join_all(targets.iter().map(|id| self.initiate(id))).await;

        let mut report = SweepReport::default();
        for (id, result) in targets.iter().zip(results) {
            match result {
                Ok(HandshakeOutcome::Established(_)) => report.established += 1,
                Ok(HandshakeOutcome::AlreadyNeighbour) => report.already += 1,
                Ok(HandshakeOutcome::Blocked) => report.blocked += 1,
                Ok(HandshakeOutcome::Refused) => report.refused += 1,
                Err(e) => {
                    tracing::warn!(peer = %id, error = %e, "handshake failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
