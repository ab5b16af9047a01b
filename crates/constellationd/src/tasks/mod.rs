//! Periodic node tasks. Each runs until the shutdown broadcast fires.

pub mod churn;
pub mod discovery;
pub mod handshake;
pub mod heartbeat;

pub use churn::ChurnTask;
pub use discovery::DiscoveryTask;
pub use handshake::HandshakeSweepTask;
pub use heartbeat::HeartbeatTask;
