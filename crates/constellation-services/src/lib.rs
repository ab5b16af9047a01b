//! constellation-services — the constellation engine.
//!
//! Neighbour lifecycle (discovery, handshake, churn, blocklist), gossip
//! replication of the constellation view, routing-table generation and
//! failure-aware forwarding. I/O leaves the engine only through
//! [`transport::PeerTransport`] and [`discovery::Prober`].

pub mod churn;
pub mod discovery;
pub mod gossip;
pub mod handshake;
pub mod neighbor;
pub mod node;
pub mod rebuild;
pub mod relay;
pub mod routing;
pub mod store;
pub mod transport;

pub use node::{NodeContext, NodeStatus};
pub use transport::{PeerTransport, TransportError};
