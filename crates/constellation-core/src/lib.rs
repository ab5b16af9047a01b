//! constellation-core — shared data model, protocol payloads, envelope codec,
//! node identity, and configuration. All other constellation crates depend on this one.
pub mod config;
pub mod envelope;
pub mod identity;
pub mod message;
pub mod node;
pub mod route;

pub use node::{now_ms, ConstellationEntry, ConstellationSnapshot, NeighborRecord, NodeId};
pub use route::{Route, RouteType, RoutingTable};
